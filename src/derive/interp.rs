//! Yearly series from sparse observations.

use std::collections::BTreeMap;

use polars::frame::DataFrame;

use crate::{
    common::frame::{f64_values, str_values, take_rows, year_values, FrameBuilder},
    error::Result,
};

/// Linear interpolation of `points` (ascending, finite) at `year`; constant beyond both ends.
pub fn interpolate_at(points: &[(i32, f64)], year: i32) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else { return f64::NAN };
    if year <= first.0 {
        return first.1;
    }
    if year >= last.0 {
        return last.1;
    }
    let upper = points.partition_point(|&(y, _)| y < year);
    let (y1, v1) = points[upper];
    if y1 == year {
        return v1;
    }
    let (y0, v0) = points[upper - 1];
    v0 + (v1 - v0) * f64::from(year - y0) / f64::from(y1 - y0)
}

/// Values of one column keyed by the years that have a row; unknown values stay NaN.
#[derive(Debug, Default, Clone)]
struct Observed {
    present: BTreeMap<i32, f64>,
}

impl Observed {
    /// A duplicate year keeps the first known value.
    fn insert(&mut self, year: i32, value: f64) {
        let slot = self.present.entry(year).or_insert(value);
        if slot.is_nan() {
            *slot = value;
        }
    }

    fn points(&self) -> Vec<(i32, f64)> {
        self.present.iter().filter(|(_, v)| !v.is_nan()).map(|(y, v)| (*y, *v)).collect()
    }

    /// The row's value for a present year, otherwise interpolated from the known `points`.
    fn value_at(&self, points: &[(i32, f64)], year: i32) -> f64 {
        match self.present.get(&year) {
            Some(&v) => v,
            None => interpolate_at(points, year),
        }
    }
}

fn observe(df: &DataFrame, columns: &[&str]) -> Result<Vec<Observed>> {
    let mut slots = vec![Observed::default(); columns.len()];
    if df.height() == 0 {
        return Ok(slots);
    }
    let years = year_values(df, "year")?;
    for (slot, name) in slots.iter_mut().zip(columns) {
        for (&year, value) in years.iter().zip(f64_values(df, name)?) {
            slot.insert(year, value);
        }
    }
    Ok(slots)
}

fn series_frame(countries: Option<Vec<String>>, years: Vec<i32>, columns: &[&str], values: Vec<Vec<f64>>) -> Result<DataFrame> {
    let mut builder = FrameBuilder::new();
    if let Some(countries) = countries {
        builder = builder.str("country", countries);
    }
    builder = builder.i32("year", years);
    for (name, vals) in columns.iter().zip(values) {
        builder = builder.f64(name, vals);
    }
    builder.build()
}

/// Interpolates every column of a (country, year, ...) frame to each year of the overall range.
///
/// Years with a row keep that row's value, unknown included; only the missing years are
/// interpolated from the known values. A country with no known value for a column stays
/// unknown for that column. Output is sorted by country, then year.
pub fn interpolate_by_country(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let years = year_values(df, "year")?;
    let (Some(&lo), Some(&hi)) = (years.iter().min(), years.iter().max()) else {
        return series_frame(Some(Vec::new()), Vec::new(), columns, vec![Vec::new(); columns.len()]);
    };

    let mut countries: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, country) in str_values(df, "country")?.into_iter().enumerate() {
        countries.entry(country.unwrap_or_default()).or_default().push(row);
    }
    let span = (hi - lo + 1) as usize;
    let mut out_country = Vec::with_capacity(countries.len() * span);
    let mut out_year = Vec::with_capacity(countries.len() * span);
    let mut out_values: Vec<Vec<f64>> = vec![Vec::with_capacity(countries.len() * span); columns.len()];
    for (country, rows) in &countries {
        let slots = observe(&take_rows(df, rows)?, columns)?;
        let points: Vec<Vec<(i32, f64)>> = slots.iter().map(Observed::points).collect();
        for year in lo..=hi {
            out_country.push(country.clone());
            out_year.push(year);
            for (k, slot) in slots.iter().enumerate() {
                out_values[k].push(slot.value_at(&points[k], year));
            }
        }
    }
    series_frame(Some(out_country), out_year, columns, out_values)
}

/// The series of one country (`year, <columns>`) at each of `years`, in the given order.
///
/// Present years keep their value; other years are interpolated, and held constant outside
/// the observed range, so every requested year gets a row.
pub fn interpolate_at_years(base: &DataFrame, columns: &[&str], years: &[i32]) -> Result<DataFrame> {
    let slots = observe(base, columns)?;
    let values = slots.iter()
        .map(|slot| {
            let points = slot.points();
            years.iter().map(|&y| slot.value_at(&points, y)).collect()
        })
        .collect();
    series_frame(None, years.to_vec(), columns, values)
}
