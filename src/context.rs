//! Explicit pipeline context.
//!
//! Holds the configuration, the cache handle, the packaged tables and the lazily computed
//! cross-country derivations (`country_bcef`, `country_root_ratio`). Everything lazy is computed
//! on first use and kept for the lifetime of the context.

use std::{
    cell::{OnceCell, RefCell},
    collections::HashMap,
};

use log::{debug, info};
use polars::prelude::*;

use crate::{
    cache::{memoize_frame, CacheDir, Fetcher, Transport},
    common::frame::{filter_eq, year_values, FrameBuilder},
    config::Config,
    derive::{
        bcef::{area_by_type, bcef_by_year, coefficients_frame, join_stock_and_area},
        carbon::{carbon_frame, carbon_increments},
        genus::{genus_composition, stock_by_kind},
        increments::{cbm_increments, faostat_increments, hpffre_increments, ipcc_increments, soef_increments},
        interp::{interpolate_at_years, interpolate_by_country},
        root_ratio::root_ratio_by_year,
    },
    error::{PullerError, Result},
    harmonize::Harmonizer,
    sources::{Cbm, Faostat, Fra, FraTable, Hpffre, Ipcc, Soef, SoefTable, Source},
    tables::{CountryInfo, Tables},
};

/// A coefficient series per (country, year), observed and interpolated to every year.
#[derive(Debug, Clone)]
pub struct CountrySeries {
    pub by_country_year: DataFrame,
    pub by_country_year_intrpld: DataFrame,
}

pub struct Context {
    pub config: Config,
    pub cache: CacheDir,
    pub tables: Tables,
    countries: Vec<String>,
    fetcher: Fetcher,
    normalized: RefCell<HashMap<&'static str, DataFrame>>,
    country_bcef: OnceCell<CountrySeries>,
    country_root_ratio: OnceCell<CountrySeries>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        Self::build(config, fetcher)
    }

    /// A context whose downloads go through `transport` instead of HTTP.
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Result<Self> {
        let fetcher = Fetcher::with_transport(transport, config.polite_delay);
        Self::build(config, fetcher)
    }

    fn build(config: Config, fetcher: Fetcher) -> Result<Self> {
        config.validate()?;
        let tables = Tables::packaged()?;
        let countries = if config.countries.is_empty() {
            tables.countries.iso2_codes()
        } else {
            for iso2 in &config.countries {
                if tables.countries.by_iso2(iso2).is_none() {
                    return Err(PullerError::UnknownCountry(iso2.clone()));
                }
            }
            config.countries.clone()
        };
        let cache = CacheDir::from_config(&config);
        info!("[context] {} countries, cache at {}", countries.len(), cache.root().display());
        Ok(Self {
            config,
            cache,
            tables,
            countries,
            fetcher,
            normalized: RefCell::new(HashMap::new()),
            country_bcef: OnceCell::new(),
            country_root_ratio: OnceCell::new(),
        })
    }

    /// Configured ISO2 codes.
    pub fn countries(&self) -> &[String] { &self.countries }

    pub fn fetcher(&self) -> &Fetcher { &self.fetcher }

    pub fn harmonizer(&self) -> Harmonizer<'_> {
        Harmonizer::new(&self.tables.names, &self.tables.countries, &self.countries)
    }

    /// In-memory memo of a source's normalized frame.
    pub fn normalized(&self, name: &'static str, producer: impl FnOnce() -> Result<DataFrame>) -> Result<DataFrame> {
        if let Some(df) = self.normalized.borrow().get(name) {
            return Ok(df.clone());
        }
        let df = producer()?;
        self.normalized.borrow_mut().insert(name, df.clone());
        Ok(df)
    }

    /// Drops the frames derived from `provider`'s raw files of one country, on disk and in
    /// memory, after those raw files changed.
    pub fn invalidate_derived(&self, provider: &str, iso2: &str) -> Result<()> {
        if self.cache.invalidate(&self.cache.artifact_dir(provider, iso2))? {
            info!("[cache] dropped {provider} frames of {iso2}");
        }
        self.normalized.borrow_mut().clear();
        Ok(())
    }

    pub fn country(&self, iso2: &str) -> Result<Country<'_>> {
        let info = self.tables.countries.by_iso2(iso2)
            .ok_or_else(|| PullerError::UnknownCountry(iso2.to_string()))?;
        Ok(Country { ctx: self, info })
    }

    /// Climate- and area-weighted BCEF per (country, year), from SOEF stocks and areas.
    pub fn country_bcef(&self) -> Result<&CountrySeries> {
        if let Some(series) = self.country_bcef.get() {
            return Ok(series);
        }
        let series = self.coefficient_series("bcef", &["bcef_i", "bcef_r", "bcef_s"], |c| c.bcef_by_year())?;
        Ok(self.country_bcef.get_or_init(|| series))
    }

    /// Climate- and area-weighted root-to-shoot ratio per (country, year).
    pub fn country_root_ratio(&self) -> Result<&CountrySeries> {
        if let Some(series) = self.country_root_ratio.get() {
            return Ok(series);
        }
        let series = self.coefficient_series("root_ratio", &["root_ratio"], |c| c.root_ratio_by_year())?;
        Ok(self.country_root_ratio.get_or_init(|| series))
    }

    fn coefficient_series(
        &self,
        artifact: &str,
        columns: &[&str],
        per_country: impl Fn(&Country<'_>) -> Result<DataFrame>,
    ) -> Result<CountrySeries> {
        let mut frames = Vec::new();
        for iso2 in &self.countries {
            let path = self.cache.artifact("conversion", iso2, artifact);
            let country = self.country(iso2)?;
            let mut df = memoize_frame(&path, || per_country(&country))?;
            let n = df.height();
            df.with_column(Column::new("country".into(), vec![iso2.clone(); n]))?;
            frames.push(df.select(["country", "year"].into_iter().chain(columns.iter().copied()))?);
        }
        let by_country_year = concat_frames(frames, || {
            columns.iter().fold(FrameBuilder::new().str("country", vec![]).i32("year", vec![]), |b, c| b.f64(c, vec![]))
                .build()
        })?;
        let by_country_year_intrpld = interpolate_by_country(&by_country_year, columns)?;
        debug!("[derive] {artifact}: {} observed rows", by_country_year.height());
        Ok(CountrySeries { by_country_year, by_country_year_intrpld })
    }
}

/// Vertically stacks frames with identical schemas; `empty` builds the result when there are none.
pub fn concat_frames(frames: Vec<DataFrame>, empty: impl FnOnce() -> Result<DataFrame>) -> Result<DataFrame> {
    let mut iter = frames.into_iter();
    let Some(mut acc) = iter.next() else { return empty() };
    for df in iter {
        acc.vstack_mut(&df)?;
    }
    Ok(acc)
}

/// One country with typed accessors on every provider view.
pub struct Country<'a> {
    ctx: &'a Context,
    pub info: &'a CountryInfo,
}

impl<'a> Country<'a> {
    pub fn iso2(&self) -> &str { &self.info.iso2 }

    pub fn ipcc(&self) -> Result<DataFrame> { Ipcc.per_country(self.ctx, self.iso2()) }

    pub fn soef(&self, table: SoefTable) -> Result<DataFrame> { Soef::new(table).per_country(self.ctx, self.iso2()) }

    pub fn faostat_land(&self) -> Result<DataFrame> { Faostat::land().per_country(self.ctx, self.iso2()) }

    pub fn faostat_forestry(&self) -> Result<DataFrame> { Faostat::forestry().per_country(self.ctx, self.iso2()) }

    pub fn hpffre(&self) -> Result<DataFrame> { Hpffre.per_country(self.ctx, self.iso2()) }

    pub fn fra(&self, table: FraTable) -> Result<DataFrame> { Fra::new(table).per_country(self.ctx, self.iso2()) }

    pub fn cbm(&self) -> Result<DataFrame> { Cbm.per_country(self.ctx, self.iso2()) }

    /// Forest area as reported by each source: source, year, area (ha).
    pub fn area_df(&self) -> Result<DataFrame> {
        let soef_area = Soef::new(SoefTable::ForestArea);
        let fra_extent = Fra::new(FraTable::Extent);
        let land = Faostat::land();
        let mut views: Vec<(&dyn Source, &str)> = vec![
            (&Ipcc, "area"),
            (&soef_area, "area"),
            (&land, "forest"),
            (&fra_extent, "forest"),
            (&Hpffre, "area"),
        ];
        if self.ctx.config.cbm_dir.is_some() {
            views.push((&Cbm, "area"));
        }

        let (mut sources, mut years, mut areas) = (Vec::new(), Vec::new(), Vec::new());
        for (source, stat) in views {
            let df = source.per_country(self.ctx, self.iso2())?;
            for (year, area) in source.series(&df, stat)? {
                sources.push(source.name().to_string());
                years.push(year);
                areas.push(area);
            }
        }
        FrameBuilder::new().str("source", sources).i32("year", years).f64("area", areas).build()
    }

    /// Gain, loss and net per hectare from every source that reports growth.
    pub fn increments_df(&self) -> Result<DataFrame> {
        let mut frames = vec![
            tag_source(ipcc_increments(&self.ipcc()?)?, "ipcc")?,
            tag_source(self.soef_increments()?, "soef")?,
            tag_source(self.faostat_increments()?, "faostat")?,
            tag_source(hpffre_increments(&self.hpffre()?, self.ctx.config.hpffre_last_observed_year)?, "hpffre")?,
        ];
        if self.ctx.config.cbm_dir.is_some() && Cbm::covers(self.iso2()) {
            frames.push(tag_source(cbm_increments(&self.cbm()?)?, "cbm")?);
        }
        concat_frames(frames, crate::derive::increments::empty_increments)
    }

    pub fn soef_increments(&self) -> Result<DataFrame> {
        soef_increments(&self.soef(SoefTable::Fellings)?, &self.soef(SoefTable::ForestArea)?)
    }

    pub fn faostat_increments(&self) -> Result<DataFrame> {
        faostat_increments(&self.faostat_forestry()?, &self.faostat_land()?)
    }

    /// SOEF increments in t C/ha; coefficients are joined on the exact observed years.
    pub fn soef_carbon(&self) -> Result<DataFrame> {
        let bcef = self.coefficients_of(&self.ctx.country_bcef()?.by_country_year)?;
        let roots = self.coefficients_of(&self.ctx.country_root_ratio()?.by_country_year)?;
        let rows = carbon_increments(&self.soef_increments()?, &bcef, &roots, self.ctx.config.carbon_fraction)?;
        carbon_frame(&rows)
    }

    /// FAOSTAT increments in t C/ha. The coefficients are interpolated at every FAOSTAT year and
    /// held constant beyond the observed ones, so no FAOSTAT year is dropped.
    pub fn faostat_carbon(&self) -> Result<DataFrame> {
        let increments = self.faostat_increments()?;
        let years = year_values(&increments, "year")?;
        let bcef = interpolate_at_years(
            &self.coefficients_of(&self.ctx.country_bcef()?.by_country_year)?,
            &["bcef_i", "bcef_r", "bcef_s"],
            &years,
        )?;
        let roots = interpolate_at_years(
            &self.coefficients_of(&self.ctx.country_root_ratio()?.by_country_year)?,
            &["root_ratio"],
            &years,
        )?;
        let rows = carbon_increments(&increments, &bcef, &roots, self.ctx.config.carbon_fraction)?;
        carbon_frame(&rows)
    }

    fn coefficients_of(&self, by_country_year: &DataFrame) -> Result<DataFrame> {
        let mut df = filter_eq(by_country_year, "country", self.iso2())?;
        let _ = df.drop_in_place("country")?;
        Ok(df)
    }

    /// Growing stock per (year, genus) with per-year fractions.
    pub fn stock_comp_genus(&self) -> Result<DataFrame> {
        genus_composition(&self.soef(SoefTable::StockComp)?)
    }

    fn stock_and_area(&self) -> Result<Vec<crate::derive::bcef::TypeRecord>> {
        let stock = stock_by_kind(&self.stock_comp_genus()?, &self.ctx.tables.species)?;
        let area = area_by_type(&self.soef(SoefTable::ForestType)?)?;
        join_stock_and_area(&stock, &area)
    }

    /// Observed BCEF of this country: year, bcef_i, bcef_r, bcef_s.
    pub fn bcef_by_year(&self) -> Result<DataFrame> {
        let weights = self.ctx.tables.countries.weights(self.iso2())?;
        let rows = bcef_by_year(&self.stock_and_area()?, &weights, &self.ctx.tables.bcef)?;
        coefficients_frame(&rows, &["bcef_i", "bcef_r", "bcef_s"])
    }

    /// Observed root-to-shoot ratio of this country: year, root_ratio.
    pub fn root_ratio_by_year(&self) -> Result<DataFrame> {
        let weights = self.ctx.tables.countries.weights(self.iso2())?;
        let rows = root_ratio_by_year(&self.stock_and_area()?, &weights, &self.ctx.tables.bcef, &self.ctx.tables.root_ratio)?;
        coefficients_frame(&rows, &["root_ratio"])
    }
}

fn tag_source(mut df: DataFrame, source: &str) -> Result<DataFrame> {
    let n = df.height();
    df.insert_column(0, Column::new("source".into(), vec![source.to_string(); n]))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::write_frame, common::frame::f64_values, test_util::{assert_close, test_context}};

    fn write(ctx: &Context, provider: &str, name: &str, df: DataFrame) {
        write_frame(&ctx.cache.artifact(provider, "AT", name), &df).unwrap();
    }

    /// SOEF increments for 2000 and 2010 with coefficients observed in 2000 only.
    fn populated(cache: &std::path::Path) -> Context {
        let ctx = test_context(cache, &["AT"]);
        write(&ctx, "soef", "soef_forest_area", FrameBuilder::new()
            .i32("year", vec![2000, 2010])
            .str("category", vec!["forest_aws".into(), "forest_aws".into()])
            .f64("area", vec![100.0, 100.0])
            .build()
            .unwrap());
        write(&ctx, "soef", "soef_fellings", FrameBuilder::new()
            .i32("year", vec![2000, 2010])
            .str("category", vec!["forest_aws".into(), "forest_aws".into()])
            .f64("gross_increment", vec![800.0, 800.0])
            .f64("natural_losses", vec![100.0, 100.0])
            .f64("fellings_total", vec![300.0, 300.0])
            .f64("fellings_fuelwood", vec![0.0, 0.0])
            .build()
            .unwrap());
        write(&ctx, "conversion", "bcef", FrameBuilder::new()
            .i32("year", vec![2000])
            .f64("bcef_i", vec![1.0])
            .f64("bcef_r", vec![1.2])
            .f64("bcef_s", vec![1.1])
            .build()
            .unwrap());
        write(&ctx, "conversion", "root_ratio", FrameBuilder::new()
            .i32("year", vec![2000])
            .f64("root_ratio", vec![0.25])
            .build()
            .unwrap());
        ctx
    }

    #[test]
    fn soef_carbon_uses_observed_years_only() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = populated(tmp.path());
        let df = ctx.country("AT").unwrap().soef_carbon().unwrap();
        assert_eq!(year_values(&df, "year").unwrap(), vec![2000]);
        let fraction = ctx.config.carbon_fraction;
        assert_close(f64_values(&df, "gain_per_ha_tc").unwrap()[0], 8.0 * 1.0 * 1.25 * fraction);
        assert_close(f64_values(&df, "loss_per_ha_tc").unwrap()[0], -4.0 * 1.2 * 1.25 * fraction);
    }

    #[test]
    fn interpolated_series_keep_observed_values() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = populated(tmp.path());
        let bcef = ctx.country_bcef().unwrap();
        assert_eq!(bcef.by_country_year.height(), 1);
        let intrpld = filter_eq(&bcef.by_country_year_intrpld, "country", "AT").unwrap();
        let years = year_values(&intrpld, "year").unwrap();
        let at_2000 = years.iter().position(|&y| y == 2000).unwrap();
        assert_close(f64_values(&intrpld, "bcef_i").unwrap()[at_2000], 1.0);
    }

    #[test]
    fn faostat_carbon_covers_years_outside_soef() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = populated(tmp.path());
        write(&ctx, "conversion", "bcef", FrameBuilder::new()
            .i32("year", vec![2000, 2010])
            .f64("bcef_i", vec![1.0, 1.4])
            .f64("bcef_r", vec![1.2, 1.6])
            .f64("bcef_s", vec![1.1, 1.1])
            .build()
            .unwrap());
        write(&ctx, "conversion", "root_ratio", FrameBuilder::new()
            .i32("year", vec![2000, 2010])
            .f64("root_ratio", vec![0.25, 0.35])
            .build()
            .unwrap());
        let faostat_years: Vec<i32> = (1995..=2015).step_by(5).collect();
        let n = faostat_years.len();
        write(&ctx, "faostat/land", "faostat_land", FrameBuilder::new()
            .str("item", vec!["forest".into(); n])
            .str("element", vec!["area".into(); n])
            .i32("year", faostat_years.clone())
            .f64("value", vec![100.0; n])
            .build()
            .unwrap());
        write(&ctx, "faostat/forestry", "faostat_forestry", FrameBuilder::new()
            .str("item", vec!["roundwood".into(); n])
            .str("element", vec!["production".into(); n])
            .i32("year", faostat_years.clone())
            .f64("value", vec![400.0; n])
            .build()
            .unwrap());

        let df = ctx.country("AT").unwrap().faostat_carbon().unwrap();
        assert_eq!(year_values(&df, "year").unwrap(), faostat_years);
        let loss = f64_values(&df, "loss_per_ha_tc").unwrap();
        let fraction = ctx.config.carbon_fraction;
        // Held before 2000 and after 2010, observed on 2000 and 2010, interpolated in 2005.
        assert_close(loss[0], -4.0 * 1.2 * 1.25 * fraction);
        assert_close(loss[1], -4.0 * 1.2 * 1.25 * fraction);
        assert_close(loss[2], -4.0 * 1.4 * 1.30 * fraction);
        assert_close(loss[3], -4.0 * 1.6 * 1.35 * fraction);
        assert_close(loss[4], -4.0 * 1.6 * 1.35 * fraction);
        assert!(f64_values(&df, "gain_per_ha_tc").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn unknown_country_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_context(tmp.path(), &["AT"]);
        assert!(matches!(ctx.country("XX"), Err(PullerError::UnknownCountry(_))));
    }
}
