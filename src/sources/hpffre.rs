//! Historical and projected forest resources (HPFFRE) bulk table.

use std::path::PathBuf;

use log::info;
use polars::prelude::{Column, DataFrame};

use crate::{
    cache::{write_atomic, Decompress},
    common::{
        frame::{read_csv_file, set_str, sort_by_country_year, str_values, year_values},
        fs::read_zip_member,
    },
    context::Context,
    error::{PullerError, Result},
};

use super::Source;

const URL: &str = "https://zenodo.org/records/3362650/files/hpffre.zip";

const COUNTRY_RENAMES: &[(&str, &str)] = &[("Czech", "Czech Republic"), ("UK", "United Kingdom")];

#[derive(Debug, Clone, Copy)]
pub struct Hpffre;

impl Hpffre {
    fn csv_path(&self, ctx: &Context) -> Result<PathBuf> {
        Ok(ctx.cache.dir(&["hpffre", "zip"])?.join("hpffre.csv"))
    }
}

impl Source for Hpffre {
    fn name(&self) -> &'static str { "hpffre" }

    fn provider(&self) -> &'static str { "hpffre" }

    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        let csv = self.csv_path(ctx)?;
        if csv.exists() {
            return Ok(());
        }
        let dir = ctx.cache.dir(&["hpffre", "zip"])?;
        let zip = ctx.fetcher().fetch_cached(URL, &dir, "zip", Decompress::None)?;
        let Some((name, bytes)) = read_zip_member(&zip, |n| n.to_ascii_lowercase().ends_with(".csv"))? else {
            return Err(PullerError::Parse {
                path: zip,
                sheet: String::new(),
                title: "hpffre".into(),
                country: String::new(),
                reason: "archive holds no CSV".into(),
            });
        };
        info!("[extract] {name} -> {}", csv.display());
        write_atomic(&csv, &bytes)?;
        for iso2 in ctx.countries() {
            ctx.invalidate_derived(self.provider(), iso2)?;
        }
        Ok(())
    }

    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame> {
        self.refresh_raw(ctx)?;
        read_csv_file(&self.csv_path(ctx)?)
    }

    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame> {
        let mut df = raw.clone();
        let countries = str_values(&df, "Country")?
            .into_iter()
            .map(|c| {
                let c = c.unwrap_or_default().trim().to_string();
                COUNTRY_RENAMES.iter().find(|(from, _)| *from == c).map_or(c, |(_, to)| to.to_string())
            })
            .collect();
        set_str(&mut df, "Country", countries)?;

        let harmonizer = ctx.harmonizer();
        let df = harmonizer.columns(self.name(), &df)?;
        let df = harmonizer.country_names_to_iso2(&df)?;
        let mut df = harmonizer.restrict(&df)?;
        // Years come as text from the CSV; differencing needs them numeric and ordered.
        let years = year_values(&df, "year")?;
        df.with_column(Column::new("year".into(), years))?;
        sort_by_country_year(&df)
    }

    fn statistics(&self) -> &'static [&'static str] {
        &["area", "growing_stock_volume_total", "growing_stock_per_ha", "fellings_per_ha", "increment_per_ha"]
    }
}
