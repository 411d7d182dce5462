//! Growing stock composition by genus.

use std::collections::BTreeMap;

use polars::prelude::*;

use crate::{
    common::frame::{category_values, f64_values, filter_mask, set_str, sum_by, year_values, FrameBuilder, MISSING},
    error::Result,
    harmonize::redistribute_unknown,
    tables::{ForestType, SpeciesTable},
};

/// year, genus, growing_stock (m³), fraction of the year's known total.
pub fn genus_composition(stock_comp: &DataFrame) -> Result<DataFrame> {
    if stock_comp.height() == 0 {
        return FrameBuilder::new()
            .i32("year", Vec::new())
            .str("genus", Vec::new())
            .f64("growing_stock", Vec::new())
            .f64("fraction", Vec::new())
            .build();
    }
    let mut df = stock_comp.select(["year", "genus", "growing_stock"])?;
    set_str(&mut df, "genus", category_values(stock_comp, "genus")?)?;
    let grouped = sum_by(&df, &["year", "genus"], &["growing_stock"])?;

    let stock = f64_values(&grouped, "growing_stock")?;
    let known = filter_mask(&grouped, stock.iter().map(|v| !v.is_nan()).collect())?;
    let mut totals = sum_by(&known, &["year"], &["growing_stock"])?;
    totals.rename("growing_stock", "total".into())?;

    let joined = grouped
        .left_join(&totals, ["year"], ["year"])?
        .sort(["year", "genus"], SortMultipleOptions::default())?;
    let stock = f64_values(&joined, "growing_stock")?;
    let fractions: Vec<f64> = f64_values(&joined, "total")?
        .into_iter()
        .zip(&stock)
        .map(|(total, v)| if total > 0.0 { v / total } else { f64::NAN })
        .collect();
    let mut out = joined.select(["year", "genus", "growing_stock"])?;
    out.with_column(Column::new("fraction".into(), fractions))?;
    Ok(out)
}

/// Genera ordered by their mean growing stock over years, largest first.
pub fn genus_order(composition: &DataFrame) -> Result<Vec<String>> {
    if composition.height() == 0 {
        return Ok(Vec::new());
    }
    let stock = f64_values(composition, "growing_stock")?;
    let mut known = filter_mask(composition, stock.iter().map(|v| !v.is_nan()).collect())?.select(["genus"])?;
    known.with_column(Column::new("growing_stock".into(), stock.into_iter().filter(|v| !v.is_nan()).collect::<Vec<_>>()))?;
    let means = known.lazy()
        .group_by([col("genus")])
        .agg([col("growing_stock").mean()])
        .sort(["growing_stock", "genus"], SortMultipleOptions::default().with_order_descending_multi([true, false]))
        .collect()?;
    category_values(&means, "genus")
}

/// Coniferous and broadleaved stock per year; stock of unknown genera is split equally.
pub fn stock_by_kind(composition: &DataFrame, species: &SpeciesTable) -> Result<Vec<(i32, ForestType, f64)>> {
    if composition.height() == 0 {
        return Ok(Vec::new());
    }
    let years = year_values(composition, "year")?;
    let genus = category_values(composition, "genus")?;
    let stock = f64_values(composition, "growing_stock")?;

    let mut by_year: BTreeMap<i32, Vec<(&'static str, f64)>> = BTreeMap::new();
    for row in 0..composition.height() {
        let label = match species.kind_of_genus(&genus[row]) {
            Some(kind) => kind.forest_type().as_str(),
            None => MISSING,
        };
        by_year.entry(years[row]).or_default().push((label, stock[row]));
    }

    let targets = [ForestType::Con.as_str(), ForestType::Broad.as_str()];
    let mut out = Vec::new();
    for (year, rows) in by_year {
        for (label, value) in redistribute_unknown(&rows, &targets) {
            if let Some(ft) = ForestType::from_label(&label) {
                out.push((year, ft, value));
            }
        }
    }
    Ok(out)
}
