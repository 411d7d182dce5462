use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while acquiring, parsing and deriving forest statistics.
#[derive(Error, Debug)]
pub enum PullerError {
    /// Missing packaged resource or malformed name map.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure or non-success status.
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a crawler-block page.
    #[error("blocked by {url} (robots noindex page returned)")]
    Blocked { url: String },

    /// A workbook or CSV did not have the expected shape.
    #[error("parse error in {} [sheet={sheet}, title={title}, country={country}]: {reason}", path.display())]
    Parse {
        path: PathBuf,
        sheet: String,
        title: String,
        country: String,
        reason: String,
    },

    /// A recomputed total disagreed with the provider's own total.
    #[error("sanity check failed for {country} {year}: {reason}")]
    SanityCheck { country: String, year: i32, reason: String },

    /// More than one coefficient row matched a lookup triple.
    #[error("{matches} {table} rows match zone={zone} type={forest_type} stock={stock}")]
    CoefficientLookup {
        table: &'static str,
        zone: String,
        forest_type: String,
        stock: f64,
        matches: usize,
    },

    /// A field declared non-null after harmonization contained a null.
    #[error("unexpected missing value in column '{column}': {detail}")]
    DataInvariant { column: String, detail: String },

    #[error("unknown country: {0}")]
    UnknownCountry(String),

    #[error("unknown statistic '{stat}' for source {source_name}")]
    UnknownStatistic { source_name: &'static str, stat: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl PullerError {
    /// True when a different transport (e.g. a browser-like fetcher) may succeed.
    pub fn is_blocked(&self) -> bool {
        matches!(self, PullerError::Blocked { .. })
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PullerError::Configuration(msg.into())
    }

    pub(crate) fn invariant(column: impl Into<String>, detail: impl Into<String>) -> Self {
        PullerError::DataInvariant { column: column.into(), detail: detail.into() }
    }
}

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, PullerError>;
