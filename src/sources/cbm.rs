//! EU-CBM model outputs, read from a local directory of per-country CSVs.
//!
//! `<cbm_dir>/<ISO2>/area.csv` holds `scenario, year, status, area`;
//! `<cbm_dir>/<ISO2>/increments.csv` holds `scenario, year, status, gross_growth,
//! harvest_and_mortality`. Both are joined on (scenario, year, status).

use std::path::PathBuf;

use log::{debug, warn};
use polars::prelude::*;

use crate::{
    common::frame::{category_values, f64_values, filter_mask, read_csv_file, year_values, MISSING},
    context::Context,
    error::{PullerError, Result},
    harmonize::Unmapped,
};

use super::Source;

/// Countries without CBM runs.
const EXCLUDED: &[&str] = &["CY"];

#[derive(Debug, Clone, Copy)]
pub struct Cbm;

impl Cbm {
    /// True if CBM outputs exist for this country.
    pub fn covers(iso2: &str) -> bool {
        !EXCLUDED.contains(&iso2)
    }

    fn root(&self, ctx: &Context) -> Result<PathBuf> {
        let dir = ctx.config.cbm_dir.clone()
            .ok_or_else(|| PullerError::config(format!("cbm_dir is not set (see {})", crate::config::CBM_DIR_ENV)))?;
        if !dir.is_dir() {
            return Err(PullerError::config(format!("cbm_dir {} is not a directory", dir.display())));
        }
        Ok(dir)
    }
}

const KEYS: [&str; 3] = ["scenario", "year", "status"];

/// Area rows of one country with the matching increments; rows without increments get NaN.
fn join_country(iso2: &str, area: &DataFrame, increments: &DataFrame) -> Result<DataFrame> {
    let area = area.select(KEYS.into_iter().chain(["area"]))?;
    let increments = increments.select(KEYS.into_iter().chain(["gross_growth", "harvest_and_mortality"]))?;
    let mut df = area.left_join(&increments, KEYS, KEYS)?;
    for name in ["area", "gross_growth", "harvest_and_mortality"] {
        let values = f64_values(&df, name)?;
        df.with_column(Column::new(name.into(), values))?;
    }
    df.insert_column(0, Column::new("country".into(), vec![iso2.to_string(); df.height()]))?;
    Ok(df)
}

impl Source for Cbm {
    fn name(&self) -> &'static str { "cbm" }

    fn provider(&self) -> &'static str { "cbm" }

    /// Nothing is downloaded; checks that the output directory is configured.
    fn refresh_raw(&self, ctx: &Context) -> Result<()> {
        self.root(ctx).map(|_| ())
    }

    fn raw_frame(&self, ctx: &Context) -> Result<DataFrame> {
        let root = self.root(ctx)?;
        let mut out: Option<DataFrame> = None;
        for iso2 in ctx.countries().iter().filter(|c| Cbm::covers(c)) {
            let dir = root.join(iso2);
            let (area, increments) = (dir.join("area.csv"), dir.join("increments.csv"));
            if !area.exists() || !increments.exists() {
                warn!("[cbm] no outputs for {iso2} in {}", dir.display());
                continue;
            }
            let df = join_country(iso2, &read_csv_file(&area)?, &read_csv_file(&increments)?)?;
            debug!("[cbm] {iso2}: {} rows", df.height());
            match out.as_mut() {
                Some(acc) => { acc.vstack_mut(&df)?; }
                None => out = Some(df),
            }
        }
        match out {
            Some(df) => Ok(df),
            None => empty_raw(),
        }
    }

    fn normalize_raw(&self, ctx: &Context, raw: &DataFrame) -> Result<DataFrame> {
        let harmonizer = ctx.harmonizer();
        let df = harmonizer.columns(self.name(), raw)?;
        let df = harmonizer.restrict(&df)?;
        let df = harmonizer.rows(self.name(), &df, "scenario", Unmapped::Missing)?;
        let df = harmonizer.rows(self.name(), &df, "status", Unmapped::Missing)?;

        let scenario = category_values(&df, "scenario")?;
        let status = category_values(&df, "status")?;
        let mask = (0..df.height())
            .map(|i| scenario[i] == "historical" && status[i] != MISSING && status[i] != "non_forest")
            .collect();
        let mut df = filter_mask(&df, mask)?;
        let _ = df.drop_in_place("scenario")?;
        let years = year_values(&df, "year")?;
        df.with_column(Column::new("year".into(), years))?;
        Ok(df)
    }

    fn statistics(&self) -> &'static [&'static str] {
        &["area", "gain", "loss"]
    }
}

fn empty_raw() -> Result<DataFrame> {
    let text = |name: &str| Column::new(name.into(), Vec::<String>::new());
    let number = |name: &str| Column::new(name.into(), Vec::<f64>::new());
    Ok(DataFrame::new(vec![
        text("country"),
        text("scenario"),
        text("year"),
        text("status"),
        number("area"),
        number("gross_growth"),
        number("harvest_and_mortality"),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::frame::{column_names, read_csv_bytes},
        config::Config,
        context::Context,
    };

    fn write(dir: &std::path::Path, iso2: &str, area: &str, increments: &str) {
        let d = dir.join(iso2);
        std::fs::create_dir_all(&d).unwrap();
        std::fs::write(d.join("area.csv"), area).unwrap();
        std::fs::write(d.join("increments.csv"), increments).unwrap();
    }

    #[test]
    fn historical_forest_rows_only() {
        let tmp = tempfile::tempdir().unwrap();
        let cbm_dir = tmp.path().join("cbm");
        write(
            &cbm_dir,
            "AT",
            "scenario,year,status,area\nhistorical,2000,ForAWS,100\nhistorical,2000,NF,5\nreference,2000,ForAWS,90\nhistorical,2000,,1\n",
            "scenario,year,status,gross_growth,harvest_and_mortality\nhistorical,2000,ForAWS,700,-400\nhistorical,2000,NF,1,1\n",
        );
        let config = Config {
            cache_dir: Some(tmp.path().join("cache")),
            countries: vec!["AT".into()],
            cbm_dir: Some(cbm_dir),
            polite_delay: (0.0, 0.0),
            ..Config::default()
        };
        let ctx = Context::new(config).unwrap();
        let df = Cbm.normalize(&ctx).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(category_values(&df, "status").unwrap(), vec!["forest_aws"]);
        assert_eq!(f64_values(&df, "gain").unwrap(), vec![700.0]);
        assert_eq!(f64_values(&df, "loss").unwrap(), vec![-400.0]);
        assert_eq!(year_values(&df, "year").unwrap(), vec![2000]);
    }

    #[test]
    fn area_rows_without_increments_are_kept() {
        let area = read_csv_bytes(b"scenario,year,status,area\nhistorical,2000,ForAWS,100\nhistorical,2005,ForAWS,110\n").unwrap();
        let increments = read_csv_bytes(b"scenario,year,status,gross_growth,harvest_and_mortality\nhistorical,2005,ForAWS,700,-400\nreference,2000,ForAWS,1,1\n").unwrap();
        let df = join_country("AT", &area, &increments).unwrap();
        let df = df.sort(["year"], SortMultipleOptions::default()).unwrap();
        assert_eq!(column_names(&df), vec!["country", "scenario", "year", "status", "area", "gross_growth", "harvest_and_mortality"]);
        assert_eq!(category_values(&df, "country").unwrap(), vec!["AT", "AT"]);
        assert_eq!(f64_values(&df, "area").unwrap(), vec![100.0, 110.0]);
        let gross = f64_values(&df, "gross_growth").unwrap();
        assert!(gross[0].is_nan());
        assert_eq!(gross[1], 700.0);
        assert_eq!(f64_values(&df, "harvest_and_mortality").unwrap()[1], -400.0);
    }

    #[test]
    fn cyprus_is_excluded_and_dir_required() {
        assert!(!Cbm::covers("CY"));
        assert!(Cbm::covers("AT"));
        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::test_util::test_context(tmp.path(), &["AT"]);
        assert!(matches!(Cbm.refresh_raw(&ctx), Err(PullerError::Configuration(_))));
    }
}
