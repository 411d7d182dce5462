//! IPCC coefficient tables binned by stock per hectare.
//!
//! The packaged CSVs are wide: one column per stock bin, named `<name>_<lower>_<upper>`
//! (`upper` may be `inf`). Loading melts those columns, collapses provider forest-type synonyms
//! and pivots the factors so there is one row per (zone, type, lower, upper).

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

use crate::{
    common::frame::{column_names, f64_values, read_csv_bytes, str_values},
    error::{PullerError, Result},
};

use super::types::{ClimaticZone, ForestType};

static BIN_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[a-z]+)_(?P<lower>[0-9]+(?:\.[0-9]+)?)_(?P<upper>[0-9]+(?:\.[0-9]+)?|inf)$")
        .expect("static regex")
});

/// Half-open stock interval `(lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockBin {
    pub lower: f64,
    pub upper: f64,
}

impl StockBin {
    pub fn contains(&self, stock: f64) -> bool {
        self.lower < stock && stock <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub zone: ClimaticZone,
    pub forest_type: ForestType,
    pub bin: StockBin,
    /// Parallel to the table's `factors`.
    pub values: Vec<f64>,
}

/// A table of factors indexed by (zone, type, stock bin).
#[derive(Debug, Clone)]
pub struct CoefficientTable {
    name: &'static str,
    factors: Vec<String>,
    rows: Vec<CoefficientRow>,
}

impl CoefficientTable {
    /// Parses and stacks wide CSVs. `zone` is used when a CSV has no `climatic_zone` column.
    /// Without a `factor` column the single factor is named after the bin-column prefix.
    pub fn from_csvs(name: &'static str, factors: &[&str], csvs: &[(Option<ClimaticZone>, &str)]) -> Result<Self> {
        // (zone, type, lower bits, upper bits) -> factor -> value
        let mut cells: BTreeMap<(ClimaticZone, ForestType, u64, u64), BTreeMap<String, f64>> = BTreeMap::new();

        for (zone, text) in csvs {
            let df = read_csv_bytes(text.as_bytes())?;
            let n = df.height();
            let zones: Vec<ClimaticZone> = match zone {
                Some(z) => vec![*z; n],
                None => str_values(&df, "climatic_zone")?
                    .into_iter()
                    .map(|z| ClimaticZone::parse(z.as_deref().unwrap_or("")))
                    .collect::<Result<_>>()?,
            };
            let types: Vec<ForestType> = str_values(&df, "forest_type")?
                .into_iter()
                .map(|t| ForestType::parse(t.as_deref().unwrap_or("")))
                .collect::<Result<_>>()?;
            let factor_col = df.column("factor").is_ok().then(|| str_values(&df, "factor")).transpose()?;

            for col in column_names(&df) {
                let Some(cap) = BIN_COLUMN.captures(&col) else { continue };
                let lower = parse_bound(&cap["lower"])?;
                let upper = parse_bound(&cap["upper"])?;
                let prefix = cap["name"].to_string();
                let values = f64_values(&df, &col)?;
                for row in 0..n {
                    if values[row].is_nan() { continue } // bin not used by this forest type
                    let factor = match &factor_col {
                        Some(f) => f[row].clone().unwrap_or_default(),
                        None => prefix.clone(),
                    };
                    cells.entry((zones[row], types[row], lower.to_bits(), upper.to_bits()))
                        .or_default()
                        .insert(factor, values[row]);
                }
            }
        }

        let mut rows = Vec::with_capacity(cells.len());
        for ((zone, forest_type, lower, upper), by_factor) in cells {
            let values = factors.iter()
                .map(|f| by_factor.get(*f).copied().ok_or_else(|| PullerError::config(format!(
                    "{name}: factor {f} missing for {zone}/{forest_type}"
                ))))
                .collect::<Result<Vec<f64>>>()?;
            rows.push(CoefficientRow {
                zone,
                forest_type,
                bin: StockBin { lower: f64::from_bits(lower), upper: f64::from_bits(upper) },
                values,
            });
        }

        let table = Self { name, factors: factors.iter().map(|s| s.to_string()).collect(), rows };
        table.validate_tiling()?;
        Ok(table)
    }

    pub fn name(&self) -> &'static str { self.name }

    pub fn factors(&self) -> &[String] { &self.factors }

    pub fn rows(&self) -> &[CoefficientRow] { &self.rows }

    /// Checks that, per (zone, type), bins start at 0, are contiguous and end at infinity.
    pub fn validate_tiling(&self) -> Result<()> {
        let mut groups: BTreeMap<(ClimaticZone, ForestType), Vec<StockBin>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry((row.zone, row.forest_type)).or_default().push(row.bin);
        }
        for ((zone, ft), mut bins) in groups {
            bins.sort_by(|a, b| a.lower.total_cmp(&b.lower));
            let mut expected = 0.0;
            for bin in &bins {
                if bin.lower != expected || bin.upper <= bin.lower {
                    return Err(PullerError::config(format!(
                        "{}: bins for {zone}/{ft} do not tile at ({}, {}]", self.name, bin.lower, bin.upper
                    )));
                }
                expected = bin.upper;
            }
            if expected != f64::INFINITY {
                return Err(PullerError::config(format!("{}: bins for {zone}/{ft} stop at {expected}", self.name)));
            }
        }
        Ok(())
    }

    /// The unique row with `lower < stock <= upper`; `None` if the stock is unknown or no bin fits.
    pub fn select(&self, zone: ClimaticZone, forest_type: ForestType, stock: f64) -> Result<Option<&CoefficientRow>> {
        if stock.is_nan() {
            return Ok(None);
        }
        let mut matches = self.rows.iter()
            .filter(|r| r.zone == zone && r.forest_type == forest_type && r.bin.contains(stock));
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            return Err(PullerError::CoefficientLookup {
                table: self.name,
                zone: zone.to_string(),
                forest_type: forest_type.to_string(),
                stock,
                matches: extra + 1,
            });
        }
        Ok(first)
    }

    /// Selected factor values, NaN when nothing matches.
    pub fn select_values(&self, zone: ClimaticZone, forest_type: ForestType, stock: f64) -> Result<Vec<f64>> {
        Ok(match self.select(zone, forest_type, stock)? {
            Some(row) => row.values.clone(),
            None => vec![f64::NAN; self.factors.len()],
        })
    }

    #[cfg(test)]
    pub(crate) fn from_rows(name: &'static str, factors: &[&str], rows: Vec<CoefficientRow>) -> Self {
        Self { name, factors: factors.iter().map(|s| s.to_string()).collect(), rows }
    }
}

fn parse_bound(text: &str) -> Result<f64> {
    if text == "inf" {
        return Ok(f64::INFINITY);
    }
    text.parse::<f64>().map_err(|_| PullerError::config(format!("bad stock bound '{text}'")))
}

/// Biomass conversion and expansion factors for increments, removals and stocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bcef {
    pub i: f64,
    pub r: f64,
    pub s: f64,
}

impl Bcef {
    pub const UNKNOWN: Bcef = Bcef { i: f64::NAN, r: f64::NAN, s: f64::NAN };
}

/// IPCC 2006 vol. 4 table 4.5 restricted to one coniferous and one broadleaved row per zone.
#[derive(Debug, Clone)]
pub struct BcefTable(CoefficientTable);

impl BcefTable {
    pub const FACTORS: [&'static str; 3] = ["bcef_i", "bcef_r", "bcef_s"];

    pub fn from_csvs(boreal: &str, temperate: &str, mediterranean: &str) -> Result<Self> {
        Ok(Self(CoefficientTable::from_csvs("bcef", &Self::FACTORS, &[
            (Some(ClimaticZone::Boreal), boreal),
            (Some(ClimaticZone::Temperate), temperate),
            (Some(ClimaticZone::Mediterranean), mediterranean),
        ])?))
    }

    pub fn select(&self, zone: ClimaticZone, forest_type: ForestType, stock_per_ha: f64) -> Result<Bcef> {
        let v = self.0.select_values(zone, forest_type, stock_per_ha)?;
        Ok(Bcef { i: v[0], r: v[1], s: v[2] })
    }

    pub fn table(&self) -> &CoefficientTable { &self.0 }
}

/// Root-to-shoot ratios (IPCC 2006 vol. 4 table 4.4), binned by above-ground biomass (t/ha).
#[derive(Debug, Clone)]
pub struct RootRatioTable(CoefficientTable);

impl RootRatioTable {
    pub fn from_csv(text: &str) -> Result<Self> {
        Ok(Self(CoefficientTable::from_csvs("root_ratio", &["ratio"], &[(None, text)])?))
    }

    pub fn select(&self, zone: ClimaticZone, forest_type: ForestType, agb_per_ha: f64) -> Result<f64> {
        Ok(self.0.select_values(zone, forest_type, agb_per_ha)?[0])
    }

    pub fn table(&self) -> &CoefficientTable { &self.0 }
}
