use std::collections::{BTreeMap, HashMap};

use crate::{
    common::frame::{f64_values, read_csv_bytes, str_values},
    error::{PullerError, Result},
};

/// One provider column: its canonical name and the factor to the canonical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRename {
    pub canonical: String,
    pub unit_convert_ratio: f64,
}

/// Column renames of one provider, keyed by source label.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    entries: HashMap<String, ColumnRename>,
}

impl ColumnMap {
    pub fn get(&self, source_label: &str) -> Option<&ColumnRename> { self.entries.get(source_label) }

    pub fn canonical(&self, source_label: &str) -> Option<&str> {
        self.get(source_label).map(|r| r.canonical.as_str())
    }

    pub fn ratio(&self, source_label: &str) -> f64 {
        self.get(source_label).map_or(1.0, |r| r.unit_convert_ratio)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> { self.entries.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Row (category) renames of one provider, keyed by source label.
#[derive(Debug, Clone, Default)]
pub struct RowMap {
    entries: HashMap<String, String>,
}

impl RowMap {
    pub fn canonical(&self, source_label: &str) -> Option<&str> {
        self.entries.get(source_label.trim()).map(String::as_str)
    }

    /// Canonical codes this map can produce.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.entries.values().map(String::as_str).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// All per-provider name maps.
#[derive(Debug, Clone, Default)]
pub struct NameMaps {
    columns: BTreeMap<String, ColumnMap>,
    rows: BTreeMap<String, RowMap>,
}

impl NameMaps {
    pub fn from_csvs(columns_csv: &str, rows_csv: &str) -> Result<Self> {
        let mut maps = NameMaps::default();

        let df = read_csv_bytes(columns_csv.as_bytes())?;
        let provider = str_values(&df, "provider")?;
        let label = str_values(&df, "source_label")?;
        let canonical = str_values(&df, "canonical")?;
        let ratio = f64_values(&df, "unit_convert_ratio")?;
        for i in 0..df.height() {
            let (Some(p), Some(l), Some(c)) = (&provider[i], &label[i], &canonical[i]) else {
                return Err(PullerError::config(format!("column map row {i} is incomplete")));
            };
            if !(ratio[i] > 0.0) {
                return Err(PullerError::config(format!("{p}: unit ratio of '{l}' must be positive")));
            }
            let rename = ColumnRename { canonical: c.clone(), unit_convert_ratio: ratio[i] };
            let map = maps.columns.entry(p.clone()).or_default();
            if map.entries.insert(l.clone(), rename).is_some() {
                return Err(PullerError::config(format!("{p}: duplicate column label '{l}'")));
            }
        }

        let df = read_csv_bytes(rows_csv.as_bytes())?;
        let provider = str_values(&df, "provider")?;
        let label = str_values(&df, "source_label")?;
        let canonical = str_values(&df, "canonical")?;
        for i in 0..df.height() {
            let (Some(p), Some(l), Some(c)) = (&provider[i], &label[i], &canonical[i]) else {
                return Err(PullerError::config(format!("row map row {i} is incomplete")));
            };
            let map = maps.rows.entry(p.clone()).or_default();
            if map.entries.insert(l.trim().to_string(), c.clone()).is_some() {
                return Err(PullerError::config(format!("{p}: duplicate row label '{l}'")));
            }
        }

        Ok(maps)
    }

    /// The column map of `provider`; an unknown provider is a configuration error.
    pub fn columns(&self, provider: &str) -> Result<&ColumnMap> {
        self.columns.get(provider)
            .ok_or_else(|| PullerError::config(format!("no column map for provider '{provider}'")))
    }

    pub fn rows(&self, provider: &str) -> Result<&RowMap> {
        self.rows.get(provider)
            .ok_or_else(|| PullerError::config(format!("no row map for provider '{provider}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packaged() -> NameMaps {
        NameMaps::from_csvs(
            include_str!("../../data/column_names.csv"),
            include_str!("../../data/row_names.csv"),
        )
        .unwrap()
    }

    #[test]
    fn packaged_maps_resolve() {
        let maps = packaged();
        let hpffre = maps.columns("hpffre").unwrap();
        assert_eq!(hpffre.canonical("Forest area (1000 ha)"), Some("area"));
        assert_eq!(hpffre.ratio("Forest area (1000 ha)"), 1000.0);
        assert_eq!(hpffre.ratio("not mapped"), 1.0);
        let ipcc = maps.rows("ipcc").unwrap();
        assert_eq!(ipcc.canonical("4.A Forest land"), Some("total_forest"));
        assert!(ipcc.codes().contains(&"from_cropland"));
        assert!(maps.columns("nobody").is_err());
    }

    #[test]
    fn malformed_maps_are_configuration_errors() {
        let rows = "provider,source_label,canonical\n";
        let dup = "provider,source_label,canonical,unit_convert_ratio\nx,A,a,1\nx,A,b,1\n";
        assert!(matches!(NameMaps::from_csvs(dup, rows), Err(PullerError::Configuration(_))));
        let zero = "provider,source_label,canonical,unit_convert_ratio\nx,A,a,0\n";
        assert!(matches!(NameMaps::from_csvs(zero, rows), Err(PullerError::Configuration(_))));
    }
}
