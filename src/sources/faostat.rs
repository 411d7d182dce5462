//! FAOSTAT bulk downloads (land use and forestry production), normalized long format.

use std::path::PathBuf;

use log::info;
use polars::frame::DataFrame;

use crate::{
    cache::{write_atomic, Decompress},
    common::{
        frame::{category_values, f64_values, filter_mask, read_csv_file, set_str, str_values, year_values, FrameBuilder},
        fs::read_zip_member,
    },
    context::Context,
    error::{PullerError, Result},
    harmonize::Unmapped,
};

use super::{column_series, Source};

const LAND_URL: &str =
    "https://fenixservices.fao.org/faostat/static/bulkdownloads/Inputs_LandUse_E_All_Data_(Normalized).zip";
const FORESTRY_URL: &str =
    "https://fenixservices.fao.org/faostat/static/bulkdownloads/Forestry_E_All_Data_(Normalized).zip";

/// Provider names rewritten to the country table's long names.
const COUNTRY_RENAMES: &[(&str, &str)] = &[("Czechia", "Czech Republic")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dataset {
    Land,
    Forestry,
}

#[derive(Debug, Clone, Copy)]
pub struct Faostat {
    dataset: Dataset,
}

impl Faostat {
    pub fn land() -> Self { Self { dataset: Dataset::Land } }

    pub fn forestry() -> Self { Self { dataset: Dataset::Forestry } }

    fn url(&self) -> &'static str {
        match self.dataset {
            Dataset::Land => LAND_URL,
            Dataset::Forestry => FORESTRY_URL,
        }
    }

    fn subdir(&self) -> &'static str {
        match self.dataset {
            Dataset::Land => "land",
            Dataset::Forestry => "forestry",
        }
    }

    /// The element a statistic is read from.
    fn headline_element(&self) -> &'static str {
        match self.dataset {
            Dataset::Land => "area",
            Dataset::Forestry => "production",
        }
    }

    fn csv_path(&self, ctx: &Context) -> Result<PathBuf> {
        Ok(ctx.cache.dir(&["faostat", self.subdir(), "csv"])?.join("bulk.csv"))
    }
}

/// Converts a FAOSTAT unit to its canonical unit, returning (unit, factor).
pub fn canonical_unit(unit: &str) -> (String, f64) {
    match unit.trim().to_ascii_lowercase().as_str() {
        "1000 ha" => ("hectares".into(), 1000.0),
        "ha" => ("hectares".into(), 1.0),
        "1000 us$" => ("USD".into(), 1000.0),
        "gigagrams" => ("kg".into(), 1e6),
        "m3" => ("m3".into(), 1.0),
        _ => (unit.trim().to_string(), 1.0),
    }
}

impl Source for Faostat {
    fn name(&self) -> &'static str {
        match self.dataset {
            Dataset::Land => "faostat_land",
            Dataset::Forestry => "faostat_forestry",
        }
    }

    fn provider(&self) -> &'static str {
        match self.dataset {
            Dataset::Land => "faostat/land",
            Dataset::Forestry => "faostat/forestry",
        }
    }

    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        let csv = self.csv_path(ctx)?;
        if csv.exists() {
            return Ok(());
        }
        let zips = ctx.cache.dir(&["faostat", self.subdir(), "zips"])?;
        let zip = ctx.fetcher().fetch_cached(self.url(), &zips, "zip", Decompress::None)?;
        let member = read_zip_member(&zip, |name| {
            name.to_ascii_lowercase().ends_with(".csv") && name.contains("All_Data")
        })?;
        let Some((name, bytes)) = member else {
            return Err(PullerError::Parse {
                path: zip,
                sheet: String::new(),
                title: "bulk CSV".into(),
                country: String::new(),
                reason: "archive holds no data CSV".into(),
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
        let areas = str_values(&df, "Area")?
            .into_iter()
            .map(|a| {
                let a = a.unwrap_or_default();
                COUNTRY_RENAMES.iter().find(|(from, _)| *from == a).map_or(a, |(_, to)| to.to_string())
            })
            .collect();
        set_str(&mut df, "Area", areas)?;

        let harmonizer = ctx.harmonizer();
        let provider = self.name();
        let df = harmonizer.columns(provider, &df)?;
        let df = harmonizer.rows(provider, &df, "item", Unmapped::Drop)?;
        let df = harmonizer.rows(provider, &df, "element", Unmapped::Drop)?;
        let df = harmonizer.country_names_to_iso2(&df)?;
        let df = harmonizer.restrict(&df)?;

        let units = category_values(&df, "unit")?;
        let values = f64_values(&df, "value")?;
        let (units, values): (Vec<String>, Vec<f64>) = units.iter()
            .zip(values)
            .map(|(u, v)| {
                let (unit, factor) = canonical_unit(u);
                (unit, v * factor)
            })
            .unzip();

        let years = year_values(&df, "year")?;
        let flags = match df.column("flag") {
            Ok(_) => str_values(&df, "flag")?.into_iter().map(Option::unwrap_or_default).collect(),
            Err(_) => vec![String::new(); df.height()],
        };
        FrameBuilder::new()
            .str("country", category_values(&df, "country")?)
            .i32("year", years)
            .str("item", category_values(&df, "item")?)
            .str("element", category_values(&df, "element")?)
            .str("unit", units)
            .f64("value", values)
            .str("flag", flags)
            .build()
    }

    fn statistics(&self) -> &'static [&'static str] {
        match self.dataset {
            Dataset::Land => &["forest", "land", "agriculture", "naturally_regenerating", "planted"],
            Dataset::Forestry => &["roundwood", "roundwood_industrial", "wood_fuel", "sawnwood"],
        }
    }

    /// Value of the item `stat` under the dataset's headline element.
    fn series(&self, df: &DataFrame, stat: &str) -> Result<Vec<(i32, f64)>> {
        self.check_statistic(stat)?;
        if df.height() == 0 {
            return Ok(Vec::new());
        }
        let item = category_values(df, "item")?;
        let element = category_values(df, "element")?;
        let mask = (0..df.height()).map(|i| item[i] == stat && element[i] == self.headline_element()).collect();
        column_series(&filter_mask(df, mask)?, "value")
    }
}
