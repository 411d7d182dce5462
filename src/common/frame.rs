//! Thin helpers over Polars data frames.
//!
//! Every pipeline stage moves data around as a [`DataFrame`] keyed by `country`/`year`. These
//! helpers cover the handful of row-level operations the stages need (typed column extraction,
//! masking, ordering) so that derivation code can work on plain Rust vectors.

use std::{fs::File, io::{BufWriter, Cursor}, path::Path};

use polars::prelude::*;

use crate::error::{PullerError, Result};

/// Sentinel for an unknown categorical value.
pub const MISSING: &str = "missing";

/// Reads CSV bytes with every column typed as String; numeric parsing is done by the caller.
pub fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|po| po.with_encoding(CsvEncoding::LossyUtf8))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Reads a CSV file with every column typed as String.
pub fn read_csv_file(path: &Path) -> Result<DataFrame> {
    let bytes = std::fs::read(path)?;
    read_csv_bytes(&bytes)
}

/// Writes a data frame to a CSV file at `path`.
pub fn write_csv_file(path: &Path, df: &DataFrame) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    CsvWriter::new(writer).finish(&mut df.clone())?;
    Ok(())
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns().iter().map(|c| c.name().to_string()).collect()
}

/// String values of a column; any dtype is rendered as text, nulls stay `None`.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df.column(name)?;
    let cast = col.cast(&DataType::String)?;
    Ok(cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// String values where nulls and blanks become the `missing` sentinel.
pub fn category_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(str_values(df, name)?
        .into_iter()
        .map(|v| match v {
            Some(s) if !s.trim().is_empty() => s,
            _ => MISSING.to_string(),
        })
        .collect())
}

/// Numeric values of a column; nulls and unparsable text become NaN.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let col = df.column(name)?;
    if col.dtype() == &DataType::String {
        return Ok(col.str()?.into_iter().map(|v| v.map_or(f64::NAN, parse_number)).collect());
    }
    let cast = col.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Integer values of a column (years); unparsable entries are `None`.
pub fn i32_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>> {
    let col = df.column(name)?;
    if col.dtype() == &DataType::String {
        return Ok(col.str()?.into_iter()
            .map(|v| v.and_then(|s| {
                let x = parse_number(s);
                (x.is_finite() && x.fract() == 0.0).then_some(x as i32)
            }))
            .collect());
    }
    let cast = col.cast(&DataType::Int32)?;
    Ok(cast.i32()?.into_iter().collect())
}

/// Years of a column, failing on any null (the key is declared non-null).
pub fn year_values(df: &DataFrame, name: &str) -> Result<Vec<i32>> {
    i32_values(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, y)| y.ok_or_else(|| PullerError::invariant(name, format!("row {row} has no year"))))
        .collect()
}

/// Parses provider numbers: trims, drops thousands separators and footnote markers.
pub fn parse_number(text: &str) -> f64 {
    let cleaned: String = text.trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '*'))
        .collect();
    cleaned.parse::<f64>().unwrap_or(f64::NAN)
}

/// Keeps the rows for which `mask[i]` is true.
pub fn filter_mask(df: &DataFrame, mask: Vec<bool>) -> Result<DataFrame> {
    let series = Series::new("mask".into(), mask);
    Ok(df.filter(series.bool()?)?)
}

/// Keeps the rows whose string column equals `value`.
pub fn filter_eq(df: &DataFrame, name: &str, value: &str) -> Result<DataFrame> {
    let mask = str_values(df, name)?
        .into_iter()
        .map(|v| v.as_deref() == Some(value))
        .collect();
    filter_mask(df, mask)
}

/// Reorders (or subsets) rows by index.
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}

/// Stable sort of rows by (`country`?, `year`) keys; other columns keep their relative order.
pub fn sort_by_country_year(df: &DataFrame) -> Result<DataFrame> {
    let years = i32_values(df, "year")?;
    let countries = if has_column(df, "country") { Some(str_values(df, "country")?) } else { None };
    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by(|&a, &b| {
        let ca = countries.as_ref().map(|c| &c[a]);
        let cb = countries.as_ref().map(|c| &c[b]);
        ca.cmp(&cb).then(years[a].cmp(&years[b]))
    });
    take_rows(df, &order)
}

/// Replaces (or adds) a string column.
pub fn set_str(df: &mut DataFrame, name: &str, values: Vec<String>) -> Result<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}

/// Sorted unique years for which `predicate(row)` holds.
pub fn years_where(df: &DataFrame, predicate: impl Fn(usize) -> bool) -> Result<Vec<i32>> {
    let years = i32_values(df, "year")?;
    let mut out: Vec<i32> = years.iter()
        .enumerate()
        .filter_map(|(i, y)| y.filter(|_| predicate(i)))
        .collect();
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Sums `columns` per distinct `keys`, ascending by the keys.
///
/// Values are read through [`f64_values`] first, so unparsable text counts as NaN and a NaN
/// makes its group's sum NaN. A `year` key is read through [`year_values`].
pub fn sum_by(df: &DataFrame, keys: &[&str], columns: &[&str]) -> Result<DataFrame> {
    let mut work = df.select(keys.iter().copied())?;
    if keys.contains(&"year") {
        work.with_column(Column::new("year".into(), year_values(df, "year")?))?;
    }
    for &name in columns {
        work.with_column(Column::new(name.into(), f64_values(df, name)?))?;
    }
    let out = work.lazy()
        .group_by(keys.iter().map(|&k| col(k)).collect::<Vec<_>>())
        .agg(columns.iter().map(|&c| col(c).sum().alias(c)).collect::<Vec<_>>())
        .sort(keys.to_vec(), SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Column-by-column builder for frames assembled from typed records.
#[derive(Default)]
pub struct FrameBuilder {
    columns: Vec<Column>,
}

impl FrameBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn str(mut self, name: &str, values: Vec<String>) -> Self {
        self.columns.push(Column::new(name.into(), values));
        self
    }

    pub fn i32(mut self, name: &str, values: Vec<i32>) -> Self {
        self.columns.push(Column::new(name.into(), values));
        self
    }

    pub fn f64(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.push(Column::new(name.into(), values));
        self
    }

    pub fn build(self) -> Result<DataFrame> {
        Ok(DataFrame::new(self.columns)?)
    }
}
