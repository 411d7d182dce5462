//! One adapter per data provider behind a shared [`Source`] contract.

pub mod cbm;
pub mod faostat;
pub mod fra;
pub mod hpffre;
pub mod ipcc;
pub mod soef;

use polars::frame::DataFrame;

use crate::{
    cache::memoize_frame,
    common::frame::{f64_values, filter_eq, has_column, sort_by_country_year, sum_by, year_values},
    context::Context,
    error::{PullerError, Result},
};

pub use cbm::Cbm;
pub use faostat::Faostat;
pub use fra::{Fra, FraTable};
pub use hpffre::Hpffre;
pub use ipcc::Ipcc;
pub use soef::{Soef, SoefTable};

/// Uniform view on a provider.
pub trait Source {
    /// Unique name, used for cache artifacts and exported tables (`soef_forest_area`).
    fn name(&self) -> &'static str;

    /// Cache directory of the provider (`soef`, `faostat/land`).
    fn provider(&self) -> &'static str;

    /// Acquire the provider's artifacts into the cache. Idempotent.
    fn refresh_raw(&self, ctx: &Context) -> Result<()>;

    /// All records as one long frame with provider-native column names.
    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame>;

    /// Canonical names and units, `country` as ISO2, restricted to the configured countries.
    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame>;

    /// Statistic names accepted by [`Source::series`].
    fn statistics(&self) -> &'static [&'static str];

    fn normalize(&self, ctx: &Context) -> Result<DataFrame> {
        let raw = self.raw_frame(ctx)?;
        self.normalize_raw(ctx, &raw)
    }

    /// The normalized frame of one country, without its `country` column, sorted by year.
    fn per_country(&self, ctx: &Context, iso2: &str) -> Result<DataFrame> {
        let path = ctx.cache.artifact(self.provider(), iso2, self.name());
        memoize_frame(&path, || {
            let all = ctx.normalized(self.name(), || self.normalize(ctx))?;
            let mut df = sort_by_country_year(&filter_eq(&all, "country", iso2)?)?;
            let _ = df.drop_in_place("country")?;
            Ok(df)
        })
    }

    /// The (year, value) series of `stat` in a per-country frame, ascending by year.
    fn series(&self, df: &DataFrame, stat: &str) -> Result<Vec<(i32, f64)>> {
        self.check_statistic(stat)?;
        column_series(df, stat)
    }

    /// Sorted years in which any configured country has a value for `stat`.
    fn available_years(&self, ctx: &Context, stat: &str) -> Result<Vec<i32>> {
        self.check_statistic(stat)?;
        let mut years = Vec::new();
        for iso2 in ctx.countries() {
            let df = self.per_country(ctx, iso2)?;
            if df.height() == 0 { continue }
            years.extend(self.series(&df, stat)?.into_iter().filter(|(_, v)| !v.is_nan()).map(|(y, _)| y));
        }
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }

    fn check_statistic(&self, stat: &str) -> Result<()> {
        if self.statistics().contains(&stat) {
            Ok(())
        } else {
            Err(PullerError::UnknownStatistic { source_name: self.name(), stat: stat.to_string() })
        }
    }
}

/// Year series of a numeric column; rows of the same year are summed (NaN propagates).
pub fn column_series(df: &DataFrame, column: &str) -> Result<Vec<(i32, f64)>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    if !has_column(df, column) {
        return Err(PullerError::invariant(column, "column absent from frame"));
    }
    let sums = sum_by(df, &["year"], &[column])?;
    Ok(year_values(&sums, "year")?.into_iter().zip(f64_values(&sums, column)?).collect())
}

/// Every adapter instance the pipeline knows about.
pub fn all_sources() -> Vec<Box<dyn Source>> {
    let mut sources: Vec<Box<dyn Source>> = vec![Box::new(Ipcc)];
    sources.extend(SoefTable::ALL.into_iter().map(|t| Box::new(Soef::new(t)) as Box<dyn Source>));
    sources.push(Box::new(Faostat::land()));
    sources.push(Box::new(Faostat::forestry()));
    sources.push(Box::new(Hpffre));
    sources.extend(FraTable::ALL.into_iter().map(|t| Box::new(Fra::new(t)) as Box<dyn Source>));
    sources.push(Box::new(Cbm));
    sources
}

/// Looks an adapter up by name or provider (`soef` selects every SOEF table).
pub fn select_sources(name: &str) -> Vec<Box<dyn Source>> {
    all_sources()
        .into_iter()
        .filter(|s| name == "all" || s.name() == name || s.provider().split('/').next() == Some(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::FrameBuilder;

    #[test]
    fn series_sums_rows_of_a_year() {
        let df = FrameBuilder::new()
            .i32("year", vec![2010, 2000, 2010])
            .f64("area", vec![1.0, 2.0, 3.0])
            .build()
            .unwrap();
        assert_eq!(column_series(&df, "area").unwrap(), vec![(2000, 2.0), (2010, 4.0)]);
        assert!(column_series(&df, "stock").is_err());
    }

    #[test]
    fn source_lookup() {
        let names: Vec<&str> = select_sources("soef").iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), SoefTable::ALL.len());
        assert_eq!(select_sources("faostat_land").len(), 1);
        assert!(select_sources("nothing").is_empty());
        let all = all_sources();
        let mut unique: Vec<&str> = all.iter().map(|s| s.name()).collect();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), all.len());
    }
}
