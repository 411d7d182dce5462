//! Cross-country views of one source, aligned on the years every country reports.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use log::{debug, info};
use polars::frame::DataFrame;

use crate::{
    common::{frame::{f64_values, write_csv_file, year_values, FrameBuilder}, fs::ensure_dir_exists},
    context::Context,
    error::Result,
    sources::Source,
};

/// Years present for every country. Presence means a row exists, whatever its value.
pub fn common_years<'a>(per_country: impl IntoIterator<Item = &'a [(i32, f64)]>) -> Vec<i32> {
    let mut iter = per_country.into_iter();
    let Some(first) = iter.next() else { return Vec::new() };
    let mut years: BTreeSet<i32> = first.iter().map(|(y, _)| *y).collect();
    for series in iter {
        let other: BTreeSet<i32> = series.iter().map(|(y, _)| *y).collect();
        years.retain(|y| other.contains(y));
    }
    years.into_iter().collect()
}

/// Sums per year across countries; a NaN in any country makes the year's total NaN.
pub fn totals(per_country: &BTreeMap<String, Vec<(i32, f64)>>, years: &[i32]) -> Vec<(i32, f64)> {
    years.iter()
        .map(|&year| {
            let total = per_country.values()
                .filter_map(|s| s.iter().find(|(y, _)| *y == year).map(|(_, v)| *v))
                .sum::<f64>();
            (year, total)
        })
        .collect()
}

/// Every statistic of one source across the configured countries.
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub source: &'static str,
    /// Countries with at least one row.
    pub countries: Vec<String>,
    pub common_years: BTreeMap<&'static str, Vec<i32>>,
    /// country, year, `<stat>`; restricted to the common years.
    pub tables: BTreeMap<&'static str, DataFrame>,
    /// year, `<stat>`; summed across countries.
    pub totals: BTreeMap<&'static str, DataFrame>,
}

impl SourceSummary {
    pub fn build(ctx: &Context, source: &dyn Source) -> Result<Self> {
        let mut frames = Vec::new();
        for iso2 in ctx.countries() {
            let df = source.per_country(ctx, iso2)?;
            if df.height() > 0 {
                frames.push((iso2.clone(), df));
            }
        }

        let mut summary = SourceSummary {
            source: source.name(),
            countries: frames.iter().map(|(c, _)| c.clone()).collect(),
            common_years: BTreeMap::new(),
            tables: BTreeMap::new(),
            totals: BTreeMap::new(),
        };
        for &stat in source.statistics() {
            let per_country = frames.iter()
                .map(|(iso2, df)| Ok((iso2.clone(), source.series(df, stat)?)))
                .collect::<Result<BTreeMap<String, Vec<(i32, f64)>>>>()?;
            let years = common_years(per_country.values().map(Vec::as_slice));
            debug!("[aggregate] {}.{stat}: {} common years", summary.source, years.len());

            let (mut countries, mut table_years, mut values) = (Vec::new(), Vec::new(), Vec::new());
            for (iso2, series) in &per_country {
                for &(year, value) in series.iter().filter(|(y, _)| years.binary_search(y).is_ok()) {
                    countries.push(iso2.clone());
                    table_years.push(year);
                    values.push(value);
                }
            }
            let table = FrameBuilder::new().str("country", countries).i32("year", table_years).f64(stat, values).build()?;
            let sums = totals(&per_country, &years);
            let total = FrameBuilder::new()
                .i32("year", sums.iter().map(|(y, _)| *y).collect())
                .f64(stat, sums.iter().map(|(_, v)| *v).collect())
                .build()?;

            summary.common_years.insert(stat, years);
            summary.tables.insert(stat, table);
            summary.totals.insert(stat, total);
        }
        Ok(summary)
    }

    /// Writes `<cache>/tables/<source>_<stat>.csv`: the country rows followed by `total` rows.
    pub fn export(&self, ctx: &Context) -> Result<Vec<PathBuf>> {
        let dir = ctx.cache.root().join("tables");
        ensure_dir_exists(&dir)?;
        let mut written = Vec::new();
        for (stat, table) in &self.tables {
            let mut out = table.clone();
            if let Some(total) = self.totals.get(stat) {
                let n = total.height();
                let total = FrameBuilder::new()
                    .str("country", vec!["total".to_string(); n])
                    .i32("year", year_values(total, "year")?)
                    .f64(stat, f64_values(total, stat)?)
                    .build()?;
                out.vstack_mut(&total)?;
            }
            let path = dir.join(format!("{}_{stat}.csv", self.source));
            write_csv_file(&path, &out)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Summarizes and exports every source in `sources`.
pub fn export_tables(ctx: &Context, sources: &[Box<dyn Source>]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for source in sources {
        let summary = SourceSummary::build(ctx, source.as_ref())?;
        written.extend(summary.export(ctx)?);
    }
    info!("[tables] wrote {} tables to {}", written.len(), ctx.cache.root().join("tables").display());
    Ok(written)
}
