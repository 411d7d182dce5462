use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::write::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub sha256: String,
}

/// Scraped download URLs, persisted so that later runs are reproducible without re-scraping.
///
/// Keys are ISO2 codes (or a provider-specific group name); values are the URLs in the order
/// they are to be fetched. File hashes are recorded for every artifact fetched from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlSnapshot {
    pub provider: String,
    pub urls: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub files: BTreeMap<String, FileHash>,
}

impl UrlSnapshot {
    pub fn new(provider: &str) -> Self {
        Self { provider: provider.into(), ..Default::default() }
    }

    /// `Ok(None)` if no snapshot has been taken yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.urls.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: &str, urls: Vec<String>) {
        self.urls.insert(key.to_string(), urls);
    }

    pub fn record_file(&mut self, rel: &str, root: &Path) -> Result<()> {
        let (k, h) = sha256_file(rel, root)?;
        self.files.insert(k, FileHash { sha256: h });
        Ok(())
    }
}

/// Hash a file below `root`, returning (relative path, hex digest).
pub fn sha256_file(rel: &str, root: &Path) -> Result<(String, String)> {
    let bytes = std::fs::read(root.join(rel))?;
    Ok((rel.to_string(), hex::encode(Sha256::digest(&bytes))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ipcc/downloads/urls.json");
        assert!(UrlSnapshot::load(&path).unwrap().is_none());

        let mut snap = UrlSnapshot::new("ipcc");
        snap.insert("AT", vec!["https://unfccc.int/a.zip".into()]);
        std::fs::write(tmp.path().join("f.bin"), b"abc").unwrap();
        snap.record_file("f.bin", tmp.path()).unwrap();
        snap.save(&path).unwrap();

        let loaded = UrlSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.get("AT").unwrap().len(), 1);
        assert_eq!(
            loaded.files["f.bin"].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
