//! State of Europe's Forests: one workbook per country with tables embedded in its sheets.
//!
//! A table is located by its exact title. Its header spans a fixed number of rows below the title
//! and its body runs to the next completely empty row. Columns end at the first column that is
//! empty in every header row. Header rows are forward-filled left to right (spreadsheet merges),
//! then joined top to bottom into one snake-case name prefixed with the table key, which is the
//! label the `soef` column map knows.

use std::{collections::HashSet, path::PathBuf};

use log::{debug, info, warn};
use polars::prelude::{Column, DataFrame};

use crate::{
    cache::{memoize_frame, Decompress, UrlSnapshot},
    common::{
        frame::{category_values, column_names, f64_values, filter_mask, sort_by_country_year, str_values, FrameBuilder, MISSING},
        grid::{forward_fill, load_sheet, snake_case, Grid, SheetContext},
        html::extract_links,
    },
    context::Context,
    error::{PullerError, Result},
    harmonize::Unmapped,
};

use super::{column_series, Source};

/// Country data page listing one workbook per country.
const INDEX_URL: &str = "https://foresteurope.org/state-europes-forests-2020/country-data/";

const WORKBOOK_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoefTable {
    ForestArea,
    AgeDist,
    Fellings,
    ForestType,
    GrowingStock,
    StockComp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Category and year in the first two columns, one measure per remaining column.
    CategoryYear,
    /// Species rows with one column per year.
    YearColumns,
}

/// Where a table lives and how its header is shaped.
#[derive(Debug, Clone, Copy)]
struct TableSpec {
    key: &'static str,
    sheet: &'static str,
    title: &'static str,
    header_rows: usize,
    layout: Layout,
}

impl SoefTable {
    pub const ALL: [SoefTable; 6] = [
        SoefTable::ForestArea,
        SoefTable::AgeDist,
        SoefTable::Fellings,
        SoefTable::ForestType,
        SoefTable::GrowingStock,
        SoefTable::StockComp,
    ];

    fn spec(self) -> TableSpec {
        let (key, sheet, title, header_rows, layout) = match self {
            SoefTable::ForestArea => ("forest_area", "1.1a", "Table 1.1a - Forest area", 1, Layout::CategoryYear),
            SoefTable::AgeDist => ("age_dist", "1.3a", "Table 1.3a - Age structure", 2, Layout::CategoryYear),
            SoefTable::Fellings => ("fellings", "3.1", "Table 3.1 - Increment and fellings", 2, Layout::CategoryYear),
            SoefTable::ForestType => ("forest_type", "4.1", "Table 4.1 - Tree species composition", 2, Layout::CategoryYear),
            SoefTable::GrowingStock => ("growing_stock", "1.2a", "Table 1.2a - Growing stock", 1, Layout::CategoryYear),
            SoefTable::StockComp => ("stock_comp", "1.2b", "Table 1.2b - Growing stock composition", 1, Layout::YearColumns),
        };
        TableSpec { key, sheet, title, header_rows, layout }
    }

    pub fn key(self) -> &'static str { self.spec().key }

    fn source_name(self) -> &'static str {
        match self {
            SoefTable::ForestArea => "soef_forest_area",
            SoefTable::AgeDist => "soef_age_dist",
            SoefTable::Fellings => "soef_fellings",
            SoefTable::ForestType => "soef_forest_type",
            SoefTable::GrowingStock => "soef_growing_stock",
            SoefTable::StockComp => "soef_stock_comp",
        }
    }

    fn statistics(self) -> &'static [&'static str] {
        match self {
            SoefTable::ForestArea => &["area"],
            SoefTable::AgeDist => &["even_aged", "uneven_aged", "regeneration", "intermediate", "mature"],
            SoefTable::Fellings => &["gross_increment", "natural_losses", "fellings_total", "fellings_fuelwood"],
            SoefTable::ForestType => &["con", "broad", "mixed", "other"],
            SoefTable::GrowingStock => &["stock_total", "con", "broad"],
            SoefTable::StockComp => &["growing_stock"],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Soef {
    table: SoefTable,
}

impl Soef {
    pub fn new(table: SoefTable) -> Self { Self { table } }

    pub fn table(&self) -> SoefTable { self.table }

    /// The snapshot of workbook URLs, scraping the index page for `wanted` countries it lacks.
    fn workbook_urls(&self, ctx: &Context, wanted: &[&String]) -> Result<UrlSnapshot> {
        let path = ctx.cache.dir(&["soef", "downloads"])?.join("urls.json");
        let mut snapshot = UrlSnapshot::load(&path)?.unwrap_or_else(|| UrlSnapshot::new("soef"));
        let missing: Vec<&String> = wanted.iter().copied().filter(|c| snapshot.get(c).is_none()).collect();
        if missing.is_empty() {
            return Ok(snapshot);
        }

        info!("[scrape] {INDEX_URL} for {} countries", missing.len());
        let html = ctx.fetcher().fetch_text(INDEX_URL)?;
        let links: Vec<_> = extract_links(&html, INDEX_URL)
            .into_iter()
            .filter(|l| workbook_extension(&l.href).is_some())
            .collect();
        for iso2 in missing {
            let Some(country) = ctx.tables.countries.by_iso2(iso2) else { continue };
            match links.iter().find(|l| l.text.contains(&country.name)) {
                Some(link) => snapshot.insert(iso2, vec![link.href.clone()]),
                None => warn!("[scrape] no SOEF workbook listed for {}", country.name),
            }
        }
        snapshot.save(&path)?;
        Ok(snapshot)
    }

    /// Cached workbook of a country, if it was downloaded.
    fn workbook_path(&self, ctx: &Context, iso2: &str) -> Result<Option<PathBuf>> {
        let dir = ctx.cache.dir(&["soef", "xls"])?;
        Ok(WORKBOOK_EXTENSIONS.iter().map(|ext| dir.join(format!("{iso2}.{ext}"))).find(|p| p.exists()))
    }

    /// The table of one country with provider column names, memoized per country.
    fn country_table(&self, ctx: &Context, iso2: &str) -> Result<Option<DataFrame>> {
        let Some(workbook) = self.workbook_path(ctx, iso2)? else {
            warn!("[soef] no workbook for {iso2}");
            return Ok(None);
        };
        let spec = self.table.spec();
        let path = ctx.cache.artifact("soef", iso2, spec.key);
        let df = memoize_frame(&path, || {
            debug!("[parse] {} {} of {}", spec.sheet, spec.key, workbook.display());
            let cx = SheetContext::new(&workbook, spec.sheet, spec.title, iso2);
            let grid = load_sheet(&workbook, spec.sheet)?;
            parse_table(&grid, &spec, &cx)
        })?;
        Ok(Some(df))
    }
}

fn workbook_extension(url: &str) -> Option<&'static str> {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    WORKBOOK_EXTENSIONS.into_iter().find(|ext| path.ends_with(&format!(".{ext}")))
}

/// Bounds of a located table in absolute sheet coordinates.
struct Bounds {
    header: usize,
    data: usize,
    end: usize,
    first_col: usize,
    end_col: usize,
}

fn locate(grid: &Grid, spec: &TableSpec, cx: &SheetContext) -> Result<Bounds> {
    let (row, first_col) = grid.find_text(spec.title).ok_or_else(|| cx.error("title not found"))?;
    let header = row + 1;
    let data = header + spec.header_rows;
    let end = grid.next_empty_row(header);
    if end <= data {
        return Err(cx.error("table has no data rows"));
    }
    let width = grid.width();
    let end_col = (first_col..width)
        .find(|&c| (header..data).all(|r| grid.cell(r, c).is_empty()))
        .unwrap_or(width);
    Ok(Bounds { header, data, end, first_col, end_col })
}

/// One name per column: header rows forward-filled left to right, joined top to bottom.
fn header_names(grid: &Grid, spec: &TableSpec, b: &Bounds) -> Vec<String> {
    let mut parts: Vec<Vec<String>> = vec![Vec::new(); b.end_col - b.first_col];
    for r in b.header..b.data {
        let mut row: Vec<Option<String>> = (b.first_col..b.end_col).map(|c| grid.text(r, c)).collect();
        forward_fill(&mut row);
        for (i, label) in row.into_iter().enumerate() {
            if let Some(label) = label {
                parts[i].push(label);
            }
        }
    }
    parts.into_iter().map(|p| format!("{}_{}", spec.key, snake_case(&p.join(" ")))).collect()
}

/// Parses one embedded table into a frame with provider column names.
fn parse_table(grid: &Grid, spec: &TableSpec, cx: &SheetContext) -> Result<DataFrame> {
    let bounds = locate(grid, spec, cx)?;
    match spec.layout {
        Layout::CategoryYear => parse_category_year(grid, spec, &bounds, cx),
        Layout::YearColumns => parse_year_columns(grid, spec, &bounds, cx),
    }
}

fn parse_category_year(grid: &Grid, spec: &TableSpec, b: &Bounds, cx: &SheetContext) -> Result<DataFrame> {
    if b.end_col - b.first_col < 3 {
        return Err(cx.error("expected a category, a year and at least one measure column"));
    }
    let names = header_names(grid, spec, b);

    // Category labels are merged down over their block of years. A block ends when a year
    // repeats; the n-th label names the n-th block.
    let mut labels: Vec<String> = Vec::new();
    let mut blocks = Vec::new();
    let mut years = Vec::new();
    let mut seen = HashSet::new();
    let mut block = 0;
    for r in b.data..b.end {
        if let Some(label) = grid.text(r, b.first_col) {
            if labels.last() != Some(&label) {
                labels.push(label);
            }
        }
        let year = grid.cell(r, b.first_col + 1).year()
            .ok_or_else(|| cx.error(format!("row {} has no year", r + 1)))?;
        if !seen.insert(year) {
            block += 1;
            seen.clear();
            seen.insert(year);
        }
        blocks.push(block);
        years.push(year);
    }
    if labels.len() != block + 1 {
        return Err(cx.error(format!("{} category labels for {} year blocks", labels.len(), block + 1)));
    }

    let mut builder = FrameBuilder::new()
        .str("category", blocks.iter().map(|&i| labels[i].clone()).collect())
        .i32("year", years);
    for (i, name) in names.iter().enumerate().skip(2) {
        let col = b.first_col + i;
        let values = (b.data..b.end).map(|r| grid.cell(r, col).number().unwrap_or(f64::NAN)).collect();
        builder = builder.f64(name, values);
    }
    builder.build()
}

fn parse_year_columns(grid: &Grid, spec: &TableSpec, b: &Bounds, cx: &SheetContext) -> Result<DataFrame> {
    // Rank, scientific name, common name, then one column per year.
    let year_cols: Vec<(usize, i32)> = (b.first_col + 3..b.end_col)
        .filter_map(|c| grid.cell(b.header, c).year().map(|y| (c, y)))
        .collect();
    if year_cols.is_empty() {
        return Err(cx.error("no year columns in header"));
    }

    let (mut species, mut years, mut stock) = (Vec::new(), Vec::new(), Vec::new());
    for r in b.data..b.end {
        let rank = grid.text(r, b.first_col).unwrap_or_default();
        let name = grid.text(r, b.first_col + 1).unwrap_or_default();
        let is = |word: &str| rank.eq_ignore_ascii_case(word) || name.eq_ignore_ascii_case(word);
        if is("total") {
            continue;
        }
        let label = if is("remaining") || name.is_empty() { MISSING.to_string() } else { name };
        for &(c, year) in &year_cols {
            species.push(label.clone());
            years.push(year);
            stock.push(grid.cell(r, c).number().unwrap_or(f64::NAN));
        }
    }
    FrameBuilder::new()
        .str("species", species)
        .i32("year", years)
        .f64(&format!("{}_growing_stock", spec.key), stock)
        .build()
}

impl Source for Soef {
    fn name(&self) -> &'static str { self.table.source_name() }

    fn provider(&self) -> &'static str { "soef" }

    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        let mut pending = Vec::new();
        for iso2 in ctx.countries() {
            if self.workbook_path(ctx, iso2)?.is_none() {
                pending.push(iso2);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }
        let mut snapshot = self.workbook_urls(ctx, &pending)?;
        let dir = ctx.cache.dir(&["soef", "xls"])?;
        let mut changed = false;
        for iso2 in pending {
            let Some(url) = snapshot.get(iso2).and_then(|u| u.first()).cloned() else { continue };
            let ext = workbook_extension(&url).unwrap_or("xlsx");
            let dest = dir.join(format!("{iso2}.{ext}"));
            ctx.fetcher().fetch(&url, &dest, Decompress::None, None)?;
            snapshot.record_file(&format!("soef/xls/{iso2}.{ext}"), ctx.cache.root())?;
            // Conversion coefficients are derived from the SOEF stocks and areas.
            ctx.invalidate_derived("soef", iso2)?;
            ctx.invalidate_derived("conversion", iso2)?;
            changed = true;
        }
        if changed {
            snapshot.save(&ctx.cache.dir(&["soef", "downloads"])?.join("urls.json"))?;
        }
        Ok(())
    }

    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame> {
        self.refresh_raw(ctx)?;
        let mut out: Option<DataFrame> = None;
        for iso2 in ctx.countries() {
            let Some(mut df) = self.country_table(ctx, iso2)? else { continue };
            let n = df.height();
            df.insert_column(0, Column::new("country".into(), vec![iso2.clone(); n]))?;
            match out.as_mut() {
                Some(acc) => {
                    if column_names(acc) != column_names(&df) {
                        let spec = self.table.spec();
                        return Err(PullerError::Parse {
                            path: ctx.cache.artifact("soef", iso2, spec.key),
                            sheet: spec.sheet.into(),
                            title: spec.title.into(),
                            country: iso2.clone(),
                            reason: format!("header differs from other countries: {:?}", column_names(&df)),
                        });
                    }
                    acc.vstack_mut(&df)?;
                }
                None => out = Some(df),
            }
        }
        match out {
            Some(df) => Ok(df),
            None => FrameBuilder::new().str("country", vec![]).i32("year", vec![]).build(),
        }
    }

    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame> {
        if raw.height() == 0 {
            return Ok(raw.clone());
        }
        let harmonizer = ctx.harmonizer();
        let df = harmonizer.columns("soef", raw)?;
        let mut df = harmonizer.restrict(&df)?;
        match self.table.spec().layout {
            Layout::CategoryYear => {
                df = harmonizer.rows("soef", &df, "category", Unmapped::Drop)?;
            }
            Layout::YearColumns => {
                let genus: Vec<String> = str_values(&df, "species")?
                    .iter()
                    .map(|s| ctx.tables.species.genus_of(s.as_deref().unwrap_or("")))
                    .collect();
                df.with_column(Column::new("genus".into(), genus))?;
                let valid = f64_values(&df, "growing_stock")?.iter().map(|v| !v.is_nan()).collect();
                df = filter_mask(&df, valid)?;
            }
        }
        sort_by_country_year(&df)
    }

    fn statistics(&self) -> &'static [&'static str] {
        self.table.statistics()
    }

    /// Values of the whole forest; tables without categories sum all rows of a year.
    fn series(&self, df: &DataFrame, stat: &str) -> Result<Vec<(i32, f64)>> {
        self.check_statistic(stat)?;
        if df.height() == 0 {
            return Ok(Vec::new());
        }
        match self.table.spec().layout {
            Layout::CategoryYear => {
                let mask = category_values(df, "category")?.iter().map(|c| c == "forest").collect();
                column_series(&filter_mask(df, mask)?, stat)
            }
            Layout::YearColumns => column_series(df, stat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::year_values;

    fn table_years(df: &DataFrame) -> Vec<i32> {
        year_values(df, "year").unwrap()
    }

    fn cx() -> SheetContext {
        SheetContext::new(std::path::Path::new("AT.xlsx"), "3.1", "fellings", "AT")
    }

    fn fellings_grid() -> Grid {
        Grid::from_text(&[
            &["", "", "", "", "", "", ""],
            &["", "Table 3.1 - Increment and fellings", "", "", "", "", ""],
            &["", "Category", "Year", "Gross annual increment", "Natural losses", "Fellings", ""],
            &["", "", "", "", "", "Total", "Of which fuelwood"],
            &["", "Forest", "1990", "20", "1", "10", "2"],
            &["", "", "2000", "22", "1.5", "12", "2"],
            &["", "- of which available for wood supply", "1990", "18", "0.5", "9", "1"],
            &["", "", "2000", "20", "1", "11", "1"],
            &["", "", "", "", "", "", ""],
            &["", "Notes", "", "", "", "", ""],
        ])
    }

    #[test]
    fn multi_row_header_and_category_blocks() {
        let spec = SoefTable::Fellings.spec();
        let df = parse_table(&fellings_grid(), &spec, &cx()).unwrap();
        assert_eq!(column_names(&df), vec![
            "category",
            "year",
            "fellings_gross_annual_increment",
            "fellings_natural_losses",
            "fellings_fellings_total",
            "fellings_fellings_of_which_fuelwood",
        ]);
        assert_eq!(category_values(&df, "category").unwrap(), vec![
            "Forest",
            "Forest",
            "- of which available for wood supply",
            "- of which available for wood supply",
        ]);
        assert_eq!(table_years(&df), vec![1990, 2000, 1990, 2000]);
        assert_eq!(f64_values(&df, "fellings_natural_losses").unwrap(), vec![1.0, 1.5, 0.5, 1.0]);
    }

    #[test]
    fn missing_title_and_label_mismatch_are_parse_errors() {
        let spec = SoefTable::ForestArea.spec();
        let err = parse_table(&fellings_grid(), &spec, &cx()).unwrap_err();
        assert!(matches!(err, PullerError::Parse { ref reason, .. } if reason == "title not found"));

        let grid = Grid::from_text(&[
            &["Table 1.1a - Forest area", "", ""],
            &["Category", "Year", "Area"],
            &["Forest", "1990", "100"],
            &["", "2000", "110"],
            &["", "1990", "5"],
        ]);
        assert!(parse_table(&grid, &spec, &cx()).is_err());
    }

    #[test]
    fn stock_composition_by_year_column() {
        let grid = Grid::from_text(&[
            &["Table 1.2b - Growing stock composition", "", "", "", ""],
            &["Rank", "Scientific name", "Common name", "2010", "2015"],
            &["1", "Picea abies", "Norway spruce", "600", "610"],
            &["2", "Fagus sylvatica", "Beech", "100", "120"],
            &["Remaining", "", "", "50", "55"],
            &["TOTAL", "", "", "750", "785"],
        ]);
        let spec = SoefTable::StockComp.spec();
        let df = parse_table(&grid, &spec, &cx()).unwrap();
        assert_eq!(df.height(), 6);
        assert_eq!(category_values(&df, "species").unwrap()[4], MISSING);
        assert_eq!(table_years(&df), vec![2010, 2015, 2010, 2015, 2010, 2015]);
        assert_eq!(f64_values(&df, "stock_comp_growing_stock").unwrap()[1], 610.0);
    }

    #[test]
    fn workbook_links() {
        assert_eq!(workbook_extension("https://x.org/AT.XLSX?dl=1"), Some("xlsx"));
        assert_eq!(workbook_extension("https://x.org/at.xls"), Some("xls"));
        assert_eq!(workbook_extension("https://x.org/at.pdf"), None);
    }

    #[test]
    fn new_workbook_drops_stale_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let url = "https://example.org/soef/Austria.xlsx";
        let config = crate::config::Config {
            cache_dir: Some(tmp.path().to_path_buf()),
            countries: vec!["AT".into()],
            polite_delay: (0.0, 0.0),
            ..crate::config::Config::default()
        };
        let transport = crate::cache::FakeTransport::new(&[(url, b"PK\x03\x04", None)]);
        let ctx = Context::with_transport(config, Box::new(transport)).unwrap();
        let mut snapshot = UrlSnapshot::new("soef");
        snapshot.insert("AT", vec![url.to_string()]);
        snapshot.save(&ctx.cache.dir(&["soef", "downloads"]).unwrap().join("urls.json")).unwrap();

        // Memoized while the workbook was missing.
        let empty = FrameBuilder::new().i32("year", vec![]).f64("area", vec![]).build().unwrap();
        let stale = ctx.cache.artifact("soef", "AT", "soef_forest_area");
        let bcef = ctx.cache.artifact("conversion", "AT", "bcef");
        crate::cache::write_frame(&stale, &empty).unwrap();
        crate::cache::write_frame(&bcef, &empty).unwrap();

        Soef::new(SoefTable::ForestArea).refresh_raw(&ctx).unwrap();
        assert!(tmp.path().join("soef/xls/AT.xlsx").exists());
        assert!(!stale.exists());
        assert!(!bcef.exists());
    }

    #[test]
    fn normalized_forest_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::test_util::test_context(tmp.path(), &["AT"]);
        let mut raw = parse_table(&fellings_grid(), &SoefTable::Fellings.spec(), &cx()).unwrap();
        raw.insert_column(0, Column::new("country".into(), vec!["AT".to_string(); 4])).unwrap();
        let source = Soef::new(SoefTable::Fellings);
        let df = source.normalize_raw(&ctx, &raw).unwrap();
        assert_eq!(category_values(&df, "category").unwrap(), vec!["forest", "forest_aws", "forest", "forest_aws"]);
        assert_eq!(f64_values(&df, "gross_increment").unwrap(), vec![20_000.0, 18_000.0, 22_000.0, 20_000.0]);

        let mut per_country = df.clone();
        let _ = per_country.drop_in_place("country").unwrap();
        assert_eq!(source.series(&per_country, "fellings_total").unwrap(), vec![(1990, 10_000.0), (2000, 12_000.0)]);
    }
}
