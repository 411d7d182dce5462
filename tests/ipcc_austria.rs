// Table 4.A of the Austrian 1990 inventory, checked against the reference areas.

use std::path::Path;

use polars::prelude::Column;

use forest_puller::{
    cache::write_frame,
    common::{
        frame::{category_values, f64_values, read_csv_file, str_values, year_values},
        grid::{Grid, SheetContext},
    },
    sources::{ipcc::parse_table_4a, Ipcc, Source},
    Config, Context, PullerError,
};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn sheet() -> Grid {
    let text = std::fs::read_to_string(Path::new(FIXTURES).join("austria_1990_table4a.csv")).unwrap();
    let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split(',').collect()).collect();
    let slices: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    Grid::from_text(&slices)
}

fn context(cache: &Path) -> Context {
    let config = Config {
        cache_dir: Some(cache.to_path_buf()),
        countries: vec!["AT".into()],
        polite_delay: (0.0, 0.0),
        ..Config::default()
    };
    Context::new(config).unwrap()
}

#[test]
fn austria_1990_areas_match_the_reference() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let cx = SheetContext::new(Path::new("AUT_2021_1990_15042021_103633.xlsx"), "Table4.A", "Table 4.A", "AT");
    let rows = ctx.tables.names.rows("ipcc").unwrap();

    let mut raw = parse_table_4a(&sheet(), &cx, 1990, rows).unwrap();
    let n = raw.height();
    raw.insert_column(0, Column::new("country".into(), vec!["AT".to_string(); n])).unwrap();
    let df = Ipcc.normalize_raw(&ctx, &raw).unwrap();

    let years = year_values(&df, "year").unwrap();
    let land_use = category_values(&df, "land_use").unwrap();
    let subdivision: Vec<String> = str_values(&df, "subdivision").unwrap().into_iter().map(Option::unwrap_or_default).collect();
    let area = f64_values(&df, "area").unwrap();

    let reference = read_csv_file(&Path::new(FIXTURES).join("austria_1990.csv")).unwrap();
    let ref_years = year_values(&reference, "year").unwrap();
    let ref_land_use = category_values(&reference, "land_use").unwrap();
    let ref_sub: Vec<String> = str_values(&reference, "subdivision").unwrap().into_iter().map(Option::unwrap_or_default).collect();
    let ref_area = f64_values(&reference, "area").unwrap();

    for i in 0..reference.height() {
        let row = (0..df.height())
            .find(|&r| years[r] == ref_years[i] && land_use[r] == ref_land_use[i] && subdivision[r] == ref_sub[i])
            .unwrap_or_else(|| panic!("no row for {} {}", ref_land_use[i], ref_sub[i]));
        assert!((area[row] - ref_area[i]).abs() <= 1.0, "{}: {} vs {}", ref_land_use[i], area[row], ref_area[i]);
    }
}

fn reference_rows() -> Vec<(i32, String, String, f64)> {
    let reference = read_csv_file(&Path::new(FIXTURES).join("austria_1990.csv")).unwrap();
    let years = year_values(&reference, "year").unwrap();
    let land_use = category_values(&reference, "land_use").unwrap();
    let sub = str_values(&reference, "subdivision").unwrap();
    let area = f64_values(&reference, "area").unwrap();
    (0..reference.height())
        .map(|i| (years[i], land_use[i].clone(), sub[i].clone().unwrap_or_default(), area[i]))
        .collect()
}

#[test]
fn per_country_view_reads_the_memoized_table() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());

    // A workbook in the archive directory keeps the refresh offline; its parsed table is
    // already memoized, so the workbook itself is never opened.
    let zips = ctx.cache.dir(&["ipcc", "zips", "AT"]).unwrap();
    std::fs::write(zips.join("AUT_2021_1990_15042021_103633.xlsx"), b"").unwrap();
    let cx = SheetContext::new(Path::new("AUT_2021_1990_15042021_103633.xlsx"), "Table4.A", "Table 4.A", "AT");
    let table = parse_table_4a(&sheet(), &cx, 1990, ctx.tables.names.rows("ipcc").unwrap()).unwrap();
    write_frame(&ctx.cache.artifact("ipcc", "AT", "table_4a"), &table).unwrap();

    let df = Ipcc.per_country(&ctx, "AT").unwrap();
    assert!(df.column("country").is_err());
    assert!(ctx.cache.artifact("ipcc", "AT", "ipcc").exists());

    let years = year_values(&df, "year").unwrap();
    let land_use = category_values(&df, "land_use").unwrap();
    let subdivision: Vec<String> = str_values(&df, "subdivision").unwrap().into_iter().map(Option::unwrap_or_default).collect();
    let area = f64_values(&df, "area").unwrap();
    for (year, kind, sub, expected) in reference_rows() {
        let row = (0..df.height())
            .find(|&r| years[r] == year && land_use[r] == kind && subdivision[r] == sub)
            .unwrap_or_else(|| panic!("no row for {kind} {sub}"));
        assert!((area[row] - expected).abs() <= 1.0, "{kind}: {} vs {expected}", area[row]);
    }

    let total = Ipcc.series(&df, "area").unwrap();
    assert_eq!(total.len(), 1);
    assert!((total[0].1 - 3_878_960.0).abs() <= 1.0);
}

#[test]
fn notation_keys_read_as_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let cx = SheetContext::new(Path::new("AUT_2021_1990_15042021_103633.xlsx"), "Table4.A", "Table 4.A", "AT");
    let df = parse_table_4a(&sheet(), &cx, 1990, ctx.tables.names.rows("ipcc").unwrap()).unwrap();
    let subdivision = str_values(&df, "subdivision").unwrap();
    let coniferous = subdivision.iter().position(|s| s.as_deref() == Some("Coniferous")).unwrap();
    assert!(f64_values(&df, "area_organic").unwrap()[coniferous].is_nan());
    assert!(f64_values(&df, "dead_wood").unwrap()[coniferous].is_nan());
}

#[test]
fn truncated_sheet_is_a_parse_error() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let cx = SheetContext::new(Path::new("AUT_2021_1990_15042021_103633.xlsx"), "Table4.A", "Table 4.A", "AT");
    let text = std::fs::read_to_string(Path::new(FIXTURES).join("austria_1990_table4a.csv")).unwrap();
    let rows: Vec<Vec<&str>> = text.lines().take_while(|l| *l != ".").map(|l| l.split(',').collect()).collect();
    let slices: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    let err = parse_table_4a(&Grid::from_text(&slices), &cx, 1990, ctx.tables.names.rows("ipcc").unwrap()).unwrap_err();
    assert!(matches!(err, PullerError::Parse { .. }));
}
