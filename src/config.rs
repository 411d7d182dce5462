use std::{path::{Path, PathBuf}, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{PullerError, Result};

/// Environment variable naming the cache directory.
pub const CACHE_ENV: &str = "FOREST_PULLER_CACHE";
/// Environment variable restricting the country set (comma-separated ISO2 codes).
pub const COUNTRIES_ENV: &str = "FOREST_PULLER_COUNTRIES";
/// Environment variable pointing at the EU-CBM per-country outputs.
pub const CBM_DIR_ENV: &str = "FOREST_PULLER_CBM_DIR";

/// IPCC 2006 Guidelines, vol. 4, table 4.3 default carbon fraction of dry matter.
pub const DEFAULT_CARBON_FRACTION: f64 = 0.47;

/// Pipeline configuration. Every field has a default; env vars and CLI flags override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache root; `None` means "resolve from the environment, else a temp dir".
    pub cache_dir: Option<PathBuf>,
    /// ISO2 codes to process; empty means every country of the packaged table.
    pub countries: Vec<String>,
    /// Root of the EU-CBM derived outputs (`<cbm_dir>/<ISO2>/*.csv`).
    pub cbm_dir: Option<PathBuf>,
    /// Polite delay between requests, seconds (min, max).
    pub polite_delay: (f64, f64),
    pub user_agent: String,
    pub timeout_secs: u64,
    pub carbon_fraction: f64,
    /// HPFFRE projections beyond this year are dropped before differencing.
    pub hpffre_last_observed_year: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            countries: Vec::new(),
            cbm_dir: None,
            polite_delay: (0.5, 2.0),
            user_agent: "forest_puller/0.1 (+https://github.com/xapple/forest_puller)".into(),
            timeout_secs: 120,
            carbon_fraction: DEFAULT_CARBON_FRACTION,
            hpffre_last_observed_year: 2018,
        }
    }
}

impl Config {
    /// Default config overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (the process environment in production).
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(CACHE_ENV).filter(|s| !s.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(list) = lookup(COUNTRIES_ENV) {
            self.countries = parse_country_list(&list);
        }
        if let Some(dir) = lookup(CBM_DIR_ENV).filter(|s| !s.trim().is_empty()) {
            self.cbm_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| PullerError::config(format!("cannot read config {}: {e}", path.display())))?;
        let config: Config = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.polite_delay;
        if !(lo >= 0.0 && hi >= lo) {
            return Err(PullerError::config(format!("invalid polite_delay ({lo}, {hi})")));
        }
        if !(self.carbon_fraction > 0.0 && self.carbon_fraction <= 1.0) {
            return Err(PullerError::config(format!("carbon_fraction {} outside (0, 1]", self.carbon_fraction)));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn parse_country_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
