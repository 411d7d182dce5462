//! Provider frames to canonical frames.
//!
//! Applies the per-provider column and row name maps, converts units with the column map's
//! `unit_convert_ratio`, rewrites long country names to ISO2 and restricts rows to the
//! configured country set.

use std::collections::HashSet;

use log::debug;
use polars::prelude::*;

use crate::{
    common::frame::{category_values, column_names, f64_values, filter_mask, str_values, MISSING},
    error::{PullerError, Result},
    tables::{ColumnMap, CountryTable, NameMaps, RowMap},
};

/// What to do with category labels absent from a row map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmapped {
    /// Drop the row (the provider reports categories outside the model).
    Drop,
    /// Keep the row with the `missing` sentinel.
    Missing,
}

#[derive(Debug, Clone, Copy)]
pub struct Harmonizer<'a> {
    pub names: &'a NameMaps,
    pub countries: &'a CountryTable,
    /// ISO2 codes kept by [`Harmonizer::restrict`].
    pub selected: &'a [String],
}

impl<'a> Harmonizer<'a> {
    pub fn new(names: &'a NameMaps, countries: &'a CountryTable, selected: &'a [String]) -> Self {
        Self { names, countries, selected }
    }

    pub fn columns(&self, provider: &str, df: &DataFrame) -> Result<DataFrame> {
        rename_columns(df, self.names.columns(provider)?)
    }

    pub fn rows(&self, provider: &str, df: &DataFrame, column: &str, unmapped: Unmapped) -> Result<DataFrame> {
        rename_rows(df, column, self.names.rows(provider)?, unmapped)
    }

    /// Rewrites the long-name `country` column to ISO2, dropping names outside the table.
    pub fn country_names_to_iso2(&self, df: &DataFrame) -> Result<DataFrame> {
        names_to_iso2(df, "country", self.countries)
    }

    /// Keeps the rows of the selected countries.
    pub fn restrict(&self, df: &DataFrame) -> Result<DataFrame> {
        filter_countries(df, "country", self.selected)
    }
}

/// Renames mapped columns to their canonical names and multiplies them by their unit ratio.
/// Unmapped columns are kept as they are.
pub fn rename_columns(df: &DataFrame, map: &ColumnMap) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(df.width());
    for name in column_names(df) {
        let (target, ratio) = match map.get(&name) {
            Some(r) => (r.canonical.clone(), r.unit_convert_ratio),
            None => (name.clone(), 1.0),
        };
        if !seen.insert(target.clone()) {
            return Err(PullerError::config(format!("two columns map to '{target}'")));
        }
        let column = if ratio != 1.0 {
            let values: Vec<f64> = f64_values(df, &name)?.into_iter().map(|v| v * ratio).collect();
            Column::new(target.as_str().into(), values)
        } else {
            let mut column = df.column(&name)?.clone();
            column.rename(target.as_str().into());
            column
        };
        columns.push(column);
    }
    Ok(DataFrame::new(columns)?)
}

/// Maps the category labels of `column` through a row map.
pub fn rename_rows(df: &DataFrame, column: &str, map: &RowMap, unmapped: Unmapped) -> Result<DataFrame> {
    let labels = category_values(df, column)?;
    let mapped: Vec<Option<String>> = labels.iter().map(|l| map.canonical(l).map(str::to_string)).collect();
    let (df, mapped) = match unmapped {
        Unmapped::Drop => {
            let mask: Vec<bool> = mapped.iter().map(Option::is_some).collect();
            (filter_mask(df, mask)?, mapped.into_iter().flatten().collect::<Vec<_>>())
        }
        Unmapped::Missing => {
            (df.clone(), mapped.into_iter().map(|m| m.unwrap_or_else(|| MISSING.to_string())).collect())
        }
    };
    let mut df = df;
    df.with_column(Column::new(column.into(), mapped))?;
    Ok(df)
}

/// Rewrites long country names (or aliases) to ISO2 codes; rows with unknown names are dropped.
pub fn names_to_iso2(df: &DataFrame, column: &str, countries: &CountryTable) -> Result<DataFrame> {
    let names = str_values(df, column)?;
    let codes: Vec<Option<String>> = names.iter()
        .map(|n| n.as_deref().and_then(|n| countries.by_name(n)).map(|c| c.iso2.clone()))
        .collect();
    let dropped = codes.iter().filter(|c| c.is_none()).count();
    if dropped > 0 {
        debug!("[harmonize] dropped {dropped} rows with country names outside the table");
    }
    let mask: Vec<bool> = codes.iter().map(Option::is_some).collect();
    let mut out = filter_mask(df, mask)?;
    out.with_column(Column::new(column.into(), codes.into_iter().flatten().collect::<Vec<String>>()))?;
    Ok(out)
}

/// Keeps the rows whose `column` is one of `iso2`.
pub fn filter_countries(df: &DataFrame, column: &str, iso2: &[String]) -> Result<DataFrame> {
    let keep: HashSet<&str> = iso2.iter().map(String::as_str).collect();
    let mask = str_values(df, column)?
        .iter()
        .map(|c| c.as_deref().is_some_and(|c| keep.contains(c)))
        .collect();
    filter_mask(df, mask)
}

/// Checks that every value of `column` is in `allowed` or is the `missing` sentinel.
pub fn validate_categories(df: &DataFrame, column: &str, allowed: &[&str]) -> Result<()> {
    for value in category_values(df, column)? {
        if value != MISSING && !allowed.contains(&value.as_str()) {
            return Err(PullerError::invariant(column, format!("'{value}' is not one of {allowed:?}")));
        }
    }
    Ok(())
}

/// Fails if `column` holds a null, a NaN or the `missing` sentinel.
pub fn require_non_null(df: &DataFrame, column: &str) -> Result<()> {
    let col = df.column(column)?;
    let bad_row = if col.dtype().is_float() || col.dtype().is_integer() {
        f64_values(df, column)?.iter().position(|v| v.is_nan())
    } else {
        category_values(df, column)?.iter().position(|v| v == MISSING)
    };
    match bad_row {
        Some(row) => Err(PullerError::invariant(column, format!("row {row} is missing"))),
        None => Ok(()),
    }
}

/// Splits the values of categories outside `targets` equally over `targets`.
///
/// Returns one entry per target, in `targets` order. Unknown (NaN) values of non-target
/// categories carry nothing to redistribute and are skipped.
pub fn redistribute_unknown(rows: &[(&str, f64)], targets: &[&str]) -> Vec<(String, f64)> {
    if targets.is_empty() {
        return Vec::new();
    }
    let unknown: f64 = rows.iter()
        .filter(|(cat, v)| !targets.contains(cat) && !v.is_nan())
        .map(|(_, v)| v)
        .sum();
    let share = unknown / targets.len() as f64;
    targets.iter()
        .map(|t| {
            let known: Vec<f64> = rows.iter().filter(|(c, _)| c == t).map(|(_, v)| *v).collect();
            let base = if known.is_empty() { 0.0 } else { known.iter().sum() };
            (t.to_string(), base + share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::frame::FrameBuilder, tables::Tables};

    #[test]
    fn unknown_forest_type_is_split_equally() {
        let rows = [("con", 10.0), ("other", 20.0), ("broad", 30.0)];
        let out = redistribute_unknown(&rows, &["con", "broad"]);
        assert_eq!(out, vec![("con".to_string(), 20.0), ("broad".to_string(), 40.0)]);
    }

    #[test]
    fn unknown_values_do_not_move() {
        let rows = [("con", 10.0), ("other", f64::NAN), ("broad", 30.0)];
        let out = redistribute_unknown(&rows, &["con", "broad"]);
        assert_eq!(out, vec![("con".to_string(), 10.0), ("broad".to_string(), 30.0)]);
        let rows = [("con", f64::NAN), ("other", 4.0)];
        assert!(redistribute_unknown(&rows, &["con", "broad"])[0].1.is_nan());
    }

    #[test]
    fn columns_are_renamed_and_scaled() {
        let tables = Tables::packaged().unwrap();
        let raw = FrameBuilder::new()
            .str("Country", vec!["Austria".into()])
            .str("Forest area (1000 ha)", vec!["3.5".into()])
            .build()
            .unwrap();
        let df = rename_columns(&raw, tables.names.columns("hpffre").unwrap()).unwrap();
        assert_eq!(column_names(&df), vec!["country", "area"]);
        assert_eq!(f64_values(&df, "area").unwrap(), vec![3500.0]);
    }

    #[test]
    fn country_names_become_iso2() {
        let tables = Tables::packaged().unwrap();
        let raw = FrameBuilder::new()
            .str("country", vec!["Czechia".into(), "Japan".into(), "Austria".into()])
            .build()
            .unwrap();
        let df = names_to_iso2(&raw, "country", &tables.countries).unwrap();
        let codes: Vec<Option<String>> = str_values(&df, "country").unwrap();
        assert_eq!(codes, vec![Some("CZ".into()), Some("AT".into())]);
        let only_at = filter_countries(&df, "country", &["AT".into()]).unwrap();
        assert_eq!(only_at.height(), 1);
    }

    #[test]
    fn rows_and_categories() {
        let tables = Tables::packaged().unwrap();
        let raw = FrameBuilder::new()
            .str("land_use", vec!["Forest".into(), "Lakes".into()])
            .build()
            .unwrap();
        let map = tables.names.rows("soef").unwrap();
        let kept = rename_rows(&raw, "land_use", map, Unmapped::Missing).unwrap();
        assert_eq!(category_values(&kept, "land_use").unwrap(), vec!["forest", MISSING]);
        validate_categories(&kept, "land_use", &["forest"]).unwrap();
        assert!(require_non_null(&kept, "land_use").is_err());

        let dropped = rename_rows(&raw, "land_use", map, Unmapped::Drop).unwrap();
        assert_eq!(dropped.height(), 1);
        assert!(validate_categories(&dropped, "land_use", &["total"]).is_err());
    }
}
