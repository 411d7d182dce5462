#![doc = "Harmonized European forest statistics: acquisition, normalization and derived indicators"]
pub mod aggregate;
pub mod cache;
pub mod common;
pub mod config;
pub mod context;
pub mod derive;
pub mod error;
pub mod harmonize;
pub mod sources;
pub mod tables;

#[doc(inline)]
pub use aggregate::{export_tables, SourceSummary};

#[doc(inline)]
pub use config::Config;

#[doc(inline)]
pub use context::{Context, Country, CountrySeries};

#[doc(inline)]
pub use error::{PullerError, Result};

#[doc(inline)]
pub use sources::{all_sources, select_sources, Source};
