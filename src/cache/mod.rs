//! On-disk cache: raw downloads and derived frames.
//!
//! Layout (all below the cache root):
//!
//! ```text
//! faostat/{land,forestry}/{zips,csv}   hpffre/zip   fra/csv
//! ipcc/{downloads,zips/<iso2>}   soef/{downloads,xls}
//! <provider>/df/<iso2>/<artifact>.parquet
//! conversion/df/<iso2>/{bcef,root_ratio}.parquet
//! tables/<source>_<stat>.csv
//! ```

mod fetch;
mod memo;
mod snapshot;
mod write;

use std::{
    path::{Path, PathBuf},
    sync::Once,
};

use log::warn;
use sha2::{Digest, Sha256};

use crate::{config::Config, error::Result};

pub use fetch::{Decompress, Fetcher, HttpTransport, Progress, Transport};
pub use memo::{memoize_frame, read_frame, write_frame};
pub use snapshot::{sha256_file, FileHash, UrlSnapshot};
pub use write::{write_atomic, PendingWrite};

#[cfg(test)]
pub(crate) use fetch::tests::FakeTransport;

static VOLATILE_WARNING: Once = Once::new();

/// Resolves the cache directory: the configured path, else `<tmp>/forest_puller`.
///
/// The fallback is volatile; a warning is logged once per process.
pub fn cache_location(configured: Option<&Path>, fallback_tmp: &Path) -> PathBuf {
    match configured {
        Some(dir) => dir.to_path_buf(),
        None => {
            let dir = fallback_tmp.join("forest_puller");
            VOLATILE_WARNING.call_once(|| {
                warn!(
                    "[cache] {} is not set, using the volatile directory {}",
                    crate::config::CACHE_ENV,
                    dir.display()
                );
            });
            dir
        }
    }
}

/// Hex SHA-256 of a URL; the content address of a raw download.
pub fn url_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Handle on the cache root. Directories are created on first use.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn from_config(config: &Config) -> Self {
        Self::new(cache_location(config.cache_dir.as_deref(), &std::env::temp_dir()))
    }

    pub fn root(&self) -> &Path { &self.root }

    /// `<root>/<a>/<b>/...`, creating the directory.
    pub fn dir(&self, parts: &[&str]) -> Result<PathBuf> {
        let dir = parts.iter().fold(self.root.clone(), |p, part| p.join(part));
        crate::common::fs::ensure_dir_exists(&dir)?;
        Ok(dir)
    }

    /// Path of a derived per-country artifact: `<root>/<provider>/df/<iso2>/<artifact>.parquet`.
    pub fn artifact(&self, provider: &str, country: &str, artifact: &str) -> PathBuf {
        self.artifact_dir(provider, country).join(format!("{artifact}.parquet"))
    }

    /// `<root>/<provider>/df/<iso2>`: every derived artifact of one country.
    pub fn artifact_dir(&self, provider: &str, country: &str) -> PathBuf {
        self.root.join(provider).join("df").join(country)
    }

    /// Manual invalidation: deletes the artifact if present. Returns whether it existed.
    pub fn invalidate(&self, path: &Path) -> Result<bool> {
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
            Ok(true)
        } else if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
