//! IPCC Common Reporting Format submissions, Table 4.A (forest land).
//!
//! Every country submits one archive with one workbook per inventory year. The archive URLs are
//! scraped from the submission index and snapshotted in `ipcc/downloads/urls.json`.

use std::{path::Path, sync::LazyLock};

use log::{debug, info, warn};
use polars::prelude::{Column, DataFrame};
use regex::Regex;

use crate::{
    cache::{memoize_frame, Decompress, UrlSnapshot},
    common::{
        frame::{category_values, filter_mask, sort_by_country_year, str_values, FrameBuilder},
        fs::find_files,
        grid::{load_sheet, sheet_names, Grid, SheetContext},
        html::extract_links,
    },
    context::Context,
    error::{PullerError, Result},
    harmonize::Unmapped,
    tables::RowMap,
};

use super::{column_series, Source};

const INDEX_URL: &str = "https://unfccc.int/ghg-inventories-annex-i-parties/2021";

/// Sheet name with its spaces removed.
const SHEET: &str = "Table4.A";

/// First data row (0-based) below the fixed header block.
const FIRST_ROW: usize = 9;

/// Marker in the first column closing the data region.
const END_MARKER: &str = ".";

/// Relative tolerance of the area sanity check.
const AREA_RTOL: f64 = 1e-3;

/// Measures of columns 4..=10 (per area) and 11..=17 (absolute).
const MEASURES: [&str; 7] = [
    "biomass_gains",
    "biomass_losses",
    "biomass_net_change",
    "dead_wood",
    "litter",
    "mineral_soils",
    "organic_soils",
];

/// `AUT_2021_1990_15042021_103633.xlsx`: party, submission year, inventory year.
static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{3})[-_](\d{4})_(\d{4})_").expect("static regex"));

/// Names of the numeric columns 2..=18.
fn value_columns() -> Vec<String> {
    let mut names = vec!["area".to_string(), "area_organic".to_string()];
    names.extend(MEASURES.iter().map(|m| format!("{m}_per_area")));
    names.extend(MEASURES.iter().map(|m| m.to_string()));
    names.push("net_co2".to_string());
    names
}

/// Inventory year of a workbook, from its file name.
pub fn inventory_year(file_name: &str) -> Option<i32> {
    FILE_NAME.captures(file_name).and_then(|c| c[3].parse().ok())
}

/// Parses the data region of Table 4.A of one inventory year.
///
/// Output columns: `year, category, subdivision` then the numeric columns. The category is
/// forward-filled down the first column; the subdivision is forward-filled within a category
/// block, and the row where a category starts (empty subdivision) is the category total.
pub fn parse_table_4a(grid: &Grid, cx: &SheetContext, year: i32, rows: &RowMap) -> Result<DataFrame> {
    let end = (FIRST_ROW..grid.height())
        .find(|&r| grid.text(r, 0).as_deref() == Some(END_MARKER))
        .ok_or_else(|| cx.error(format!("end marker '{END_MARKER}' not found")))?;

    let names = value_columns();
    let mut categories = Vec::new();
    let mut subdivisions = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut category: Option<String> = None;
    let mut subdivision = String::new();
    for r in FIRST_ROW..end {
        if grid.row_is_empty(r) { continue }
        match grid.text(r, 0) {
            Some(label) => {
                category = Some(label);
                subdivision = grid.text(r, 1).unwrap_or_default();
            }
            None => {
                if let Some(sub) = grid.text(r, 1) {
                    subdivision = sub;
                }
            }
        }
        let Some(category) = &category else {
            return Err(cx.error(format!("row {} precedes any category", r + 1)));
        };
        categories.push(category.clone());
        subdivisions.push(subdivision.clone());
        for (i, column) in values.iter_mut().enumerate() {
            column.push(grid.cell(r, i + 2).number().unwrap_or(f64::NAN));
        }
    }

    check_area_total(cx, year, rows, &categories, &subdivisions, &values[0])?;

    let n = categories.len();
    let mut builder = FrameBuilder::new()
        .i32("year", vec![year; n])
        .str("category", categories)
        .str("subdivision", subdivisions);
    for (name, column) in names.iter().zip(values) {
        builder = builder.f64(name, column);
    }
    builder.build()
}

/// The forest total must equal remaining plus converted forest land.
fn check_area_total(
    cx: &SheetContext,
    year: i32,
    rows: &RowMap,
    categories: &[String],
    subdivisions: &[String],
    area: &[f64],
) -> Result<()> {
    let total_of = |code: &str| {
        (0..categories.len())
            .find(|&i| subdivisions[i].is_empty() && rows.canonical(&categories[i]) == Some(code))
            .map(|i| area[i])
    };
    let (Some(total), Some(remaining), Some(converted)) =
        (total_of("total_forest"), total_of("remaining"), total_of("converted"))
    else {
        return Err(cx.error("forest land totals not found"));
    };
    if total.is_nan() || remaining.is_nan() || converted.is_nan() {
        debug!("[ipcc] {} {year}: area totals not reported, skipping the check", cx.country);
        return Ok(());
    }
    let sum = remaining + converted;
    if (total - sum).abs() > AREA_RTOL * total.abs() {
        return Err(PullerError::SanityCheck {
            country: cx.country.clone(),
            year,
            reason: format!("forest land area {total} but remaining + converted = {sum}"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct Ipcc;

impl Ipcc {
    fn snapshot_path(ctx: &Context) -> Result<std::path::PathBuf> {
        Ok(ctx.cache.dir(&["ipcc", "downloads"])?.join("urls.json"))
    }

    /// Archive URLs per country, scraping the index and document pages for `wanted` ones it lacks.
    fn archive_urls(&self, ctx: &Context, wanted: &[&String]) -> Result<UrlSnapshot> {
        let path = Self::snapshot_path(ctx)?;
        let mut snapshot = UrlSnapshot::load(&path)?.unwrap_or_else(|| UrlSnapshot::new("ipcc"));
        let missing: Vec<&String> = wanted.iter().copied().filter(|c| snapshot.get(c).is_none()).collect();
        if missing.is_empty() {
            return Ok(snapshot);
        }

        info!("[scrape] {INDEX_URL} for {} countries", missing.len());
        let index = extract_links(&ctx.fetcher().fetch_text(INDEX_URL)?, INDEX_URL);
        for iso2 in missing {
            let Some(country) = ctx.tables.countries.by_iso2(iso2) else { continue };
            let Some(page) = index.iter().find(|l| l.text.contains(&country.name) && l.href.contains("/documents/"))
            else {
                warn!("[scrape] no CRF document page for {}", country.name);
                continue;
            };
            let html = ctx.fetcher().fetch_text(&page.href)?;
            let archive = extract_links(&html, &page.href)
                .into_iter()
                .find(|l| l.href.to_ascii_lowercase().ends_with(".zip"));
            match archive {
                Some(link) => snapshot.insert(iso2, vec![link.href]),
                None => warn!("[scrape] no archive on {}", page.href),
            }
        }
        snapshot.save(&path)?;
        Ok(snapshot)
    }

    fn zip_dir(ctx: &Context, iso2: &str) -> Result<std::path::PathBuf> {
        ctx.cache.dir(&["ipcc", "zips", iso2])
    }

    /// Table 4.A of every inventory year of one country, memoized per country.
    fn country_table(&self, ctx: &Context, iso2: &str) -> Result<Option<DataFrame>> {
        let dir = Self::zip_dir(ctx, iso2)?;
        let workbooks = find_files(&dir, &["xlsx", "xls"]);
        if workbooks.is_empty() {
            warn!("[ipcc] no workbooks for {iso2}");
            return Ok(None);
        }
        let rows = ctx.tables.names.rows("ipcc")?;
        let path = ctx.cache.artifact("ipcc", iso2, "table_4a");
        let df = memoize_frame(&path, || {
            let mut out: Option<DataFrame> = None;
            for workbook in &workbooks {
                let Some(df) = parse_workbook(workbook, iso2, rows)? else { continue };
                match out.as_mut() {
                    Some(acc) => { acc.vstack_mut(&df)?; }
                    None => out = Some(df),
                }
            }
            out.map_or_else(empty_table, Ok)
        })?;
        Ok(Some(df))
    }
}

fn parse_workbook(path: &Path, iso2: &str, rows: &RowMap) -> Result<Option<DataFrame>> {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let Some(year) = inventory_year(file_name) else {
        debug!("[ipcc] skipping {file_name}");
        return Ok(None);
    };
    let sheet = sheet_names(path)?
        .into_iter()
        .find(|s| s.replace(' ', "") == SHEET)
        .ok_or_else(|| SheetContext::new(path, SHEET, "Table 4.A", iso2).error("sheet not found"))?;
    debug!("[parse] {sheet} of {}", path.display());
    let cx = SheetContext::new(path, &sheet, "Table 4.A", iso2);
    let grid = load_sheet(path, &sheet)?;
    parse_table_4a(&grid, &cx, year, rows).map(Some)
}

fn empty_table() -> Result<DataFrame> {
    value_columns()
        .iter()
        .fold(FrameBuilder::new().i32("year", vec![]).str("category", vec![]).str("subdivision", vec![]), |b, c| {
            b.f64(c, vec![])
        })
        .build()
}

impl Source for Ipcc {
    fn name(&self) -> &'static str { "ipcc" }

    fn provider(&self) -> &'static str { "ipcc" }

    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        let mut pending = Vec::new();
        for iso2 in ctx.countries() {
            if find_files(&Self::zip_dir(ctx, iso2)?, &["xlsx", "xls"]).is_empty() {
                pending.push(iso2);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }
        let mut snapshot = self.archive_urls(ctx, &pending)?;
        for iso2 in pending {
            let Some(urls) = snapshot.get(iso2).map(<[String]>::to_vec) else { continue };
            let dir = Self::zip_dir(ctx, iso2)?;
            for url in urls {
                ctx.fetcher().fetch_cached(&url, &dir, "zip", Decompress::Zip)?;
                let rel = format!("ipcc/zips/{iso2}/{}.zip", crate::cache::url_key(&url));
                if ctx.cache.root().join(&rel).exists() {
                    snapshot.record_file(&rel, ctx.cache.root())?;
                }
            }
            ctx.invalidate_derived(self.provider(), iso2)?;
        }
        snapshot.save(&Self::snapshot_path(ctx)?)
    }

    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame> {
        self.refresh_raw(ctx)?;
        let mut out: Option<DataFrame> = None;
        for iso2 in ctx.countries() {
            let Some(mut df) = self.country_table(ctx, iso2)? else { continue };
            let n = df.height();
            df.insert_column(0, Column::new("country".into(), vec![iso2.clone(); n]))?;
            match out.as_mut() {
                Some(acc) => { acc.vstack_mut(&df)?; }
                None => out = Some(df),
            }
        }
        match out {
            Some(df) => Ok(df),
            None => {
                let mut df = empty_table()?;
                df.insert_column(0, Column::new("country".into(), Vec::<String>::new()))?;
                Ok(df)
            }
        }
    }

    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame> {
        let harmonizer = ctx.harmonizer();
        let df = harmonizer.columns(self.name(), raw)?;
        let df = harmonizer.restrict(&df)?;
        let mut df = harmonizer.rows(self.name(), &df, "category", Unmapped::Drop)?;
        df.rename("category", "land_use".into())?;
        sort_by_country_year(&df)
    }

    fn statistics(&self) -> &'static [&'static str] {
        &[
            "area",
            "area_organic",
            "biomass_gains",
            "biomass_losses",
            "biomass_net_change",
            "dead_wood",
            "litter",
            "mineral_soils",
            "organic_soils",
            "net_co2",
        ]
    }

    /// Values of the forest land total row.
    fn series(&self, df: &DataFrame, stat: &str) -> Result<Vec<(i32, f64)>> {
        self.check_statistic(stat)?;
        if df.height() == 0 {
            return Ok(Vec::new());
        }
        let land_use = category_values(df, "land_use")?;
        let subdivision = str_values(df, "subdivision")?;
        let mask = (0..df.height())
            .map(|i| land_use[i] == "total_forest" && subdivision[i].as_deref().unwrap_or("").is_empty())
            .collect();
        column_series(&filter_mask(df, mask)?, stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::frame::{column_names, f64_values}, tables::Tables};

    fn table_columns() -> Vec<String> {
        let mut names = vec!["year".to_string(), "category".to_string(), "subdivision".to_string()];
        names.extend(value_columns());
        names
    }

    fn row(label: &str, sub: &str, area: &str) -> Vec<String> {
        let mut r = vec![label.to_string(), sub.to_string(), area.to_string()];
        r.extend((3..19).map(|i| format!("{i}")));
        r
    }

    fn grid(rows: Vec<Vec<String>>) -> Grid {
        let mut all: Vec<Vec<String>> = (0..FIRST_ROW).map(|i| vec![format!("header {i}")]).collect();
        all.extend(rows);
        let refs: Vec<Vec<&str>> = all.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
        Grid::from_text(&slices)
    }

    fn cx() -> SheetContext {
        SheetContext::new(Path::new("AUT_2021_1990_15042021_103633.xlsx"), "Table4.A", "Table 4.A", "AT")
    }

    #[test]
    fn parses_and_fills_down() {
        let tables = Tables::packaged().unwrap();
        let rows = tables.names.rows("ipcc").unwrap();
        let g = grid(vec![
            row("4.A Forest land", "", "100"),
            row("4.A.1 Forest land remaining forest land", "", "90"),
            row("", "Coniferous", "60"),
            row("", "", "5"),
            row("4.A.2 Land converted to forest land", "", "10"),
            vec![".".to_string()],
            row("after the end", "", "1"),
        ]);
        let df = parse_table_4a(&g, &cx(), 1990, rows).unwrap();
        assert_eq!(df.height(), 5);
        assert_eq!(column_names(&df), table_columns());
        let sub = str_values(&df, "subdivision").unwrap();
        assert_eq!(sub[2].as_deref(), Some("Coniferous"));
        assert_eq!(sub[3].as_deref(), Some("Coniferous"));
        assert_eq!(category_values(&df, "category").unwrap()[3], "4.A.1 Forest land remaining forest land");
        assert_eq!(f64_values(&df, "net_co2").unwrap()[0], 18.0);
        assert_eq!(f64_values(&df, "biomass_gains_per_area").unwrap()[0], 4.0);
        assert_eq!(f64_values(&df, "biomass_gains").unwrap()[0], 11.0);
    }

    #[test]
    fn missing_end_marker_and_bad_totals() {
        let tables = Tables::packaged().unwrap();
        let rows = tables.names.rows("ipcc").unwrap();
        let g = grid(vec![row("4.A Forest land", "", "100")]);
        assert!(matches!(parse_table_4a(&g, &cx(), 1990, rows), Err(PullerError::Parse { .. })));

        let g = grid(vec![
            row("4.A Forest land", "", "100"),
            row("4.A.1 Forest land remaining forest land", "", "80"),
            row("4.A.2 Land converted to forest land", "", "10"),
            vec![".".to_string()],
        ]);
        assert!(matches!(parse_table_4a(&g, &cx(), 1990, rows), Err(PullerError::SanityCheck { year: 1990, .. })));
    }

    #[test]
    fn year_from_file_name() {
        assert_eq!(inventory_year("AUT_2021_1990_15042021_103633.xlsx"), Some(1990));
        assert_eq!(inventory_year("FRA-2021_2019_10042021_120000.xlsx"), Some(2019));
        assert_eq!(inventory_year("readme.xlsx"), None);
    }

    #[test]
    fn series_reads_the_total_row() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::test_util::test_context(tmp.path(), &["AT"]);
        let rows = ctx.tables.names.rows("ipcc").unwrap();
        let g = grid(vec![
            row("4.A Forest land", "", "100"),
            row("4.A.1 Forest land remaining forest land", "", "90"),
            row("4.A.2 Land converted to forest land", "", "10"),
            vec![".".to_string()],
        ]);
        let mut raw = parse_table_4a(&g, &cx(), 1990, rows).unwrap();
        raw.insert_column(0, Column::new("country".into(), vec!["AT".to_string(); 3])).unwrap();
        let mut df = Ipcc.normalize_raw(&ctx, &raw).unwrap();
        let _ = df.drop_in_place("country").unwrap();
        assert_eq!(category_values(&df, "land_use").unwrap(), vec!["total_forest", "remaining", "converted"]);
        assert_eq!(Ipcc.series(&df, "area").unwrap(), vec![(1990, 100_000.0)]);
    }
}
