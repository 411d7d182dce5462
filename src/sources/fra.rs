//! FAO Forest Resources Assessment: six long-format CSV tables from one bulk archive.
//!
//! Every table has the columns `iso3, name, year, category, value`. The value is converted with
//! the per-table factor of the `fra` column map and renamed to the table's measure.

use std::path::PathBuf;

use log::debug;
use polars::prelude::{Column, DataFrame};

use crate::{
    cache::Decompress,
    common::{
        frame::{category_values, column_names, f64_values, filter_mask, read_csv_file, str_values, year_values, FrameBuilder},
        fs::find_files,
    },
    context::Context,
    error::{PullerError, Result},
    harmonize::Unmapped,
};

use super::{column_series, Source};

const URL: &str = "https://fra-data.fao.org/api/file/bulk-download?assessmentName=fra&cycleName=2020&countryIso=WO";

/// Provider misspellings fixed before the row map applies.
const CATEGORY_FIXES: &[(&str, &str)] = &[("nataturally", "naturally")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FraTable {
    Characteristics,
    Extent,
    Establishment,
    GrowingStock,
    CarbonStock,
    BiomassStock,
}

impl FraTable {
    pub const ALL: [FraTable; 6] = [
        FraTable::Characteristics,
        FraTable::Extent,
        FraTable::Establishment,
        FraTable::GrowingStock,
        FraTable::CarbonStock,
        FraTable::BiomassStock,
    ];

    /// Key of the table in the `fra` column map.
    pub fn key(self) -> &'static str {
        match self {
            FraTable::Characteristics => "characteristics",
            FraTable::Extent => "extent",
            FraTable::Establishment => "establishment",
            FraTable::GrowingStock => "growing_stock",
            FraTable::CarbonStock => "carbon_stock",
            FraTable::BiomassStock => "biomass_stock",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            FraTable::Characteristics => "forest_characteristics.csv",
            FraTable::Extent => "forest_extent.csv",
            FraTable::Establishment => "forest_establishment.csv",
            FraTable::GrowingStock => "growing_stock.csv",
            FraTable::CarbonStock => "carbon_stock.csv",
            FraTable::BiomassStock => "biomass_stock.csv",
        }
    }

    fn source_name(self) -> &'static str {
        match self {
            FraTable::Characteristics => "fra_characteristics",
            FraTable::Extent => "fra_extent",
            FraTable::Establishment => "fra_establishment",
            FraTable::GrowingStock => "fra_growing_stock",
            FraTable::CarbonStock => "fra_carbon_stock",
            FraTable::BiomassStock => "fra_biomass_stock",
        }
    }

    /// Categories reported by the table, which are also its statistics.
    fn categories(self) -> &'static [&'static str] {
        match self {
            FraTable::Characteristics => &["naturally_regenerating", "planted", "primary"],
            FraTable::Extent => &["forest", "other_wooded_land", "other_land"],
            FraTable::Establishment => &["natural_expansion", "afforestation", "reforestation", "deforestation"],
            FraTable::GrowingStock => &["total", "con", "broad"],
            FraTable::CarbonStock => &["above_ground", "below_ground", "dead_wood", "litter", "soil", "total"],
            FraTable::BiomassStock => &["above_ground", "below_ground", "dead_wood", "total"],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fra {
    table: FraTable,
}

impl Fra {
    pub fn new(table: FraTable) -> Self { Self { table } }

    pub fn table(&self) -> FraTable { self.table }

    /// Directory the bulk archive extracts into.
    fn extracted(&self, ctx: &Context) -> Result<PathBuf> {
        let dir = ctx.cache.dir(&["fra", "csv"])?;
        ctx.fetcher().fetch_cached(URL, &dir, "zip", Decompress::Zip)
    }

    fn csv_path(&self, ctx: &Context) -> Result<PathBuf> {
        let dir = self.extracted(ctx)?;
        find_files(&dir, &["csv"])
            .into_iter()
            .find(|p| p.file_name().is_some_and(|n| n.eq_ignore_ascii_case(self.table.file_name())))
            .ok_or_else(|| PullerError::Parse {
                path: dir,
                sheet: String::new(),
                title: self.table.file_name().into(),
                country: String::new(),
                reason: "table missing from the bulk archive".into(),
            })
    }

    /// Canonical measure name and unit factor of this table's value column.
    fn measure(&self, ctx: &Context) -> Result<(String, f64)> {
        let map = ctx.tables.names.columns("fra")?;
        let rename = map.get(self.table.key())
            .ok_or_else(|| PullerError::config(format!("fra column map lacks '{}'", self.table.key())))?;
        Ok((rename.canonical.clone(), rename.unit_convert_ratio))
    }
}

fn fix_category(label: &str) -> String {
    let mut label = label.trim().to_lowercase();
    for (typo, fixed) in CATEGORY_FIXES {
        label = label.replace(typo, fixed);
    }
    label
}

/// Lower-cases every column header.
fn lowercase_headers(df: &DataFrame) -> Result<DataFrame> {
    let columns = column_names(df)
        .into_iter()
        .map(|name| {
            let mut column = df.column(&name)?.clone();
            column.rename(name.trim().to_lowercase().into());
            Ok(column)
        })
        .collect::<Result<Vec<Column>>>()?;
    Ok(DataFrame::new(columns)?)
}

impl Source for Fra {
    fn name(&self) -> &'static str { self.table.source_name() }

    fn provider(&self) -> &'static str { "fra" }

    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        self.csv_path(ctx).map(|_| ())
    }

    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame> {
        read_csv_file(&self.csv_path(ctx)?)
    }

    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame> {
        let df = lowercase_headers(raw)?;

        let iso3 = str_values(&df, "iso3")?;
        // Country rows are keyed by ISO3; names vary between cycles.
        let iso2: Vec<Option<String>> = iso3.iter()
            .map(|c| c.as_deref().and_then(|c| ctx.tables.countries.by_iso3(c.trim())).map(|c| c.iso2.clone()))
            .map(|c| c.filter(|c| ctx.countries().contains(c)))
            .collect();
        let mut df = filter_mask(&df, iso2.iter().map(Option::is_some).collect())?;
        df.with_column(Column::new("country".into(), iso2.into_iter().flatten().collect::<Vec<String>>()))?;

        let fixed = category_values(&df, "category")?.iter().map(|c| fix_category(c)).collect::<Vec<_>>();
        df.with_column(Column::new("category".into(), fixed))?;
        let df = ctx.harmonizer().rows("fra", &df, "category", Unmapped::Drop)?;

        let (measure, factor) = self.measure(ctx)?;
        debug!("[normalize] {}: value -> {measure} x{factor}", self.name());
        let values = f64_values(&df, "value")?.into_iter().map(|v| v * factor).collect();
        FrameBuilder::new()
            .str("country", category_values(&df, "country")?)
            .i32("year", year_values(&df, "year")?)
            .str("category", category_values(&df, "category")?)
            .f64(&measure, values)
            .build()
    }

    fn statistics(&self) -> &'static [&'static str] {
        self.table.categories()
    }

    /// The table's measure for the category `stat`.
    fn series(&self, df: &DataFrame, stat: &str) -> Result<Vec<(i32, f64)>> {
        self.check_statistic(stat)?;
        if df.height() == 0 {
            return Ok(Vec::new());
        }
        let Some(measure) = column_names(df).into_iter().find(|c| !matches!(c.as_str(), "year" | "category")) else {
            return Ok(Vec::new());
        };
        let categories = category_values(df, "category")?;
        let mask = categories.iter().map(|c| c == stat).collect();
        column_series(&filter_mask(df, mask)?, &measure)
    }
}
