//! Gain, loss and net change per hectare, one derivation per source.
//!
//! Every function takes a per-country frame (no `country` column) and returns
//! `year, gain_per_ha, loss_per_ha, net_per_ha`. Losses are non-positive and, unless a provider
//! reports its own net, `net = gain + loss`. Rows where all three are unknown are dropped.

use std::collections::BTreeMap;

use polars::prelude::*;

use crate::{
    common::frame::{category_values, f64_values, filter_mask, has_column, str_values, sum_by, year_values, FrameBuilder},
    error::Result,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub year: i32,
    pub gain_per_ha: f64,
    pub loss_per_ha: f64,
    pub net_per_ha: f64,
}

impl Growth {
    /// Net recomputed as `gain + loss`.
    pub fn from_gain_loss(year: i32, gain_per_ha: f64, loss_per_ha: f64) -> Self {
        Self { year, gain_per_ha, loss_per_ha, net_per_ha: gain_per_ha + loss_per_ha }
    }

    fn is_empty(&self) -> bool {
        self.gain_per_ha.is_nan() && self.loss_per_ha.is_nan() && self.net_per_ha.is_nan()
    }
}

fn per_ha(value: f64, area: f64) -> f64 {
    if area > 0.0 { value / area } else { f64::NAN }
}

pub fn growth_frame(rows: &[Growth]) -> Result<DataFrame> {
    let rows: Vec<&Growth> = rows.iter().filter(|g| !g.is_empty()).collect();
    FrameBuilder::new()
        .i32("year", rows.iter().map(|g| g.year).collect())
        .f64("gain_per_ha", rows.iter().map(|g| g.gain_per_ha).collect())
        .f64("loss_per_ha", rows.iter().map(|g| g.loss_per_ha).collect())
        .f64("net_per_ha", rows.iter().map(|g| g.net_per_ha).collect())
        .build()
}

pub fn empty_increments() -> Result<DataFrame> {
    growth_frame(&[])
}

/// Per-year sums of `columns` over the rows where `keep(row)`.
fn yearly_sums(df: &DataFrame, columns: &[&str], keep: impl Fn(usize) -> bool) -> Result<DataFrame> {
    let mask = (0..df.height()).map(keep).collect();
    sum_by(&filter_mask(df, mask)?, &["year"], columns)
}

/// IPCC Table 4.A totals: absolute carbon stock changes divided by the forest area.
pub fn ipcc_increments(df: &DataFrame) -> Result<DataFrame> {
    if df.height() == 0 {
        return empty_increments();
    }
    let land_use = category_values(df, "land_use")?;
    let subdivision = str_values(df, "subdivision")?;
    let total = |r: usize| land_use[r] == "total_forest" && subdivision[r].as_deref().unwrap_or("").is_empty();

    let sums = yearly_sums(df, &["area", "biomass_gains", "biomass_losses", "biomass_net_change"], total)?;
    let years = year_values(&sums, "year")?;
    let area = f64_values(&sums, "area")?;
    let gains = f64_values(&sums, "biomass_gains")?;
    let losses = f64_values(&sums, "biomass_losses")?;
    let net = f64_values(&sums, "biomass_net_change")?;

    let rows: Vec<Growth> = (0..sums.height())
        .map(|i| Growth {
            year: years[i],
            gain_per_ha: per_ha(gains[i], area[i]),
            loss_per_ha: per_ha(losses[i], area[i]),
            net_per_ha: per_ha(net[i], area[i]),
        })
        .collect();
    growth_frame(&rows)
}

/// SOEF: increment and fellings of the forest available for wood supply over its area.
pub fn soef_increments(fellings: &DataFrame, forest_area: &DataFrame) -> Result<DataFrame> {
    if fellings.height() == 0 || forest_area.height() == 0 {
        return empty_increments();
    }
    let fell_cat = category_values(fellings, "category")?;
    let area_cat = category_values(forest_area, "category")?;

    let area = yearly_sums(forest_area, &["area"], |r| area_cat[r] == "forest_aws")?;
    let flows = yearly_sums(fellings, &["gross_increment", "natural_losses", "fellings_total"], |r| fell_cat[r] == "forest_aws")?;
    let joined = flows
        .inner_join(&area, ["year"], ["year"])?
        .sort(["year"], SortMultipleOptions::default())?;

    let years = year_values(&joined, "year")?;
    let area = f64_values(&joined, "area")?;
    let gross = f64_values(&joined, "gross_increment")?;
    let natural = f64_values(&joined, "natural_losses")?;
    let felled = f64_values(&joined, "fellings_total")?;
    let rows: Vec<Growth> = (0..joined.height())
        .map(|i| Growth::from_gain_loss(years[i], per_ha(gross[i], area[i]), -per_ha(natural[i] + felled[i], area[i])))
        .collect();
    growth_frame(&rows)
}

/// FAOSTAT: only losses, as roundwood production over the forest land area.
pub fn faostat_increments(forestry: &DataFrame, land: &DataFrame) -> Result<DataFrame> {
    if forestry.height() == 0 || land.height() == 0 {
        return empty_increments();
    }
    let f_item = category_values(forestry, "item")?;
    let f_elem = category_values(forestry, "element")?;
    let l_item = category_values(land, "item")?;
    let l_elem = category_values(land, "element")?;

    let mut production = yearly_sums(forestry, &["value"], |r| f_item[r] == "roundwood" && f_elem[r] == "production")?;
    production.rename("value", "production".into())?;
    let mut area = yearly_sums(land, &["value"], |r| l_item[r] == "forest" && l_elem[r] == "area")?;
    area.rename("value", "area".into())?;
    let joined = production
        .inner_join(&area, ["year"], ["year"])?
        .sort(["year"], SortMultipleOptions::default())?;

    let years = year_values(&joined, "year")?;
    let production = f64_values(&joined, "production")?;
    let area = f64_values(&joined, "area")?;
    let rows: Vec<Growth> = (0..joined.height())
        .map(|i| Growth {
            year: years[i],
            gain_per_ha: f64::NAN,
            loss_per_ha: -per_ha(production[i], area[i]),
            net_per_ha: f64::NAN,
        })
        .collect();
    growth_frame(&rows)
}

/// HPFFRE: net from the yearly change of the total growing stock, loss from fellings, gain as
/// the difference. Projected years after `last_observed` are ignored.
///
/// Observations are several years apart while fellings are reported per year, so the stock
/// change between two observed years is divided by the years elapsed before dividing by the
/// area: `net = (stock[t] - stock[t0]) / (t - t0) / area[t]`, in m³/ha/year.
pub fn hpffre_increments(df: &DataFrame, last_observed: i32) -> Result<DataFrame> {
    if df.height() == 0 {
        return empty_increments();
    }
    let years = year_values(df, "year")?;
    let area = f64_values(df, "area")?;
    let stock = f64_values(df, "growing_stock_volume_total")?;
    let fellings = f64_values(df, "fellings_per_ha")?;

    // One row per observed year, ascending (scenarios share their history).
    let mut observed: BTreeMap<i32, usize> = BTreeMap::new();
    for (row, &y) in years.iter().enumerate() {
        if y <= last_observed {
            observed.entry(y).or_insert(row);
        }
    }

    let mut rows = Vec::with_capacity(observed.len());
    let mut previous: Option<(i32, f64)> = None;
    for (&year, &row) in &observed {
        let net = match previous {
            Some((y0, s0)) => per_ha((stock[row] - s0) / f64::from(year - y0), area[row]),
            None => f64::NAN,
        };
        let loss = -fellings[row];
        rows.push(Growth { year, gain_per_ha: net - loss, loss_per_ha: loss, net_per_ha: net });
        previous = Some((year, stock[row]));
    }
    growth_frame(&rows)
}

/// EU-CBM: gross growth and harvest plus mortality summed over the forest statuses.
pub fn cbm_increments(df: &DataFrame) -> Result<DataFrame> {
    if df.height() == 0 {
        return empty_increments();
    }
    let sums = sum_by(df, &["year"], &["area", "gain", "loss"])?;
    let years = year_values(&sums, "year")?;
    let area = f64_values(&sums, "area")?;
    let gain = f64_values(&sums, "gain")?;
    let loss = f64_values(&sums, "loss")?;
    let rows: Vec<Growth> = (0..sums.height())
        .map(|i| Growth::from_gain_loss(years[i], per_ha(gain[i], area[i]), -per_ha(loss[i], area[i]).abs()))
        .collect();
    growth_frame(&rows)
}

/// Reads a growth frame back into records.
pub fn growth_rows(df: &DataFrame) -> Result<Vec<Growth>> {
    if !has_column(df, "gain_per_ha") {
        return Ok(Vec::new());
    }
    let years = year_values(df, "year")?;
    let gain = f64_values(df, "gain_per_ha")?;
    let loss = f64_values(df, "loss_per_ha")?;
    let net = f64_values(df, "net_per_ha")?;
    Ok((0..df.height())
        .map(|i| Growth { year: years[i], gain_per_ha: gain[i], loss_per_ha: loss[i], net_per_ha: net[i] })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::assert_close;

    #[test]
    fn soef_gain_loss_net() {
        let fellings = FrameBuilder::new()
            .str("category", vec!["forest".into(), "forest_aws".into(), "forest_aws".into()])
            .i32("year", vec![2010, 2010, 2015])
            .f64("gross_increment", vec![999.0, 6000.0, 7000.0])
            .f64("natural_losses", vec![9.0, 500.0, 400.0])
            .f64("fellings_total", vec![9.0, 3500.0, 3600.0])
            .build()
            .unwrap();
        let area = FrameBuilder::new()
            .str("category", vec!["forest_aws".into(), "forest".into()])
            .i32("year", vec![2010, 2010])
            .f64("area", vec![1000.0, 5.0])
            .build()
            .unwrap();
        let rows = growth_rows(&soef_increments(&fellings, &area).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        let g = rows[0];
        assert_close(g.gain_per_ha, 6.0);
        assert_close(g.loss_per_ha, -4.0);
        assert_close(g.net_per_ha, g.gain_per_ha + g.loss_per_ha);
    }

    #[test]
    fn hpffre_differences_observed_years_only() {
        let df = FrameBuilder::new()
            .i32("year", vec![2010, 2005, 2015, 2020])
            .f64("area", vec![100.0, 100.0, 100.0, 100.0])
            .f64("growing_stock_volume_total", vec![1500.0, 1000.0, 2500.0, 9999.0])
            .f64("fellings_per_ha", vec![2.0, 1.0, 3.0, 0.0])
            .build()
            .unwrap();
        let rows = growth_rows(&hpffre_increments(&df, 2018).unwrap()).unwrap();
        // 2005 keeps its loss although the net is unknown.
        assert_eq!(rows.iter().map(|g| g.year).collect::<Vec<_>>(), vec![2005, 2010, 2015]);
        assert_close(rows[1].net_per_ha, 1.0);
        assert_close(rows[1].loss_per_ha, -2.0);
        assert_close(rows[1].gain_per_ha, 3.0);
        assert_close(rows[2].net_per_ha, 2.0);
        for g in &rows[1..] {
            assert_close(g.net_per_ha, g.gain_per_ha + g.loss_per_ha);
        }
    }

    #[test]
    fn hpffre_net_is_per_year_of_gap() {
        let df = FrameBuilder::new()
            .i32("year", vec![2000, 2010])
            .f64("area", vec![100.0, 100.0])
            .f64("growing_stock_volume_total", vec![1000.0, 3000.0])
            .f64("fellings_per_ha", vec![1.0, 1.0])
            .build()
            .unwrap();
        let rows = growth_rows(&hpffre_increments(&df, 2010).unwrap()).unwrap();
        // 2000 m³ over 10 years on 100 ha, not 20 m³/ha for the whole decade.
        assert_close(rows[1].net_per_ha, 2.0);
        assert_close(rows[1].gain_per_ha, 3.0);
    }

    #[test]
    fn faostat_losses_only() {
        let forestry = FrameBuilder::new()
            .str("item", vec!["roundwood".into(), "sawnwood".into()])
            .str("element", vec!["production".into(), "production".into()])
            .i32("year", vec![2000, 2000])
            .f64("value", vec![500.0, 77.0])
            .build()
            .unwrap();
        let land = FrameBuilder::new()
            .str("item", vec!["forest".into()])
            .str("element", vec!["area".into()])
            .i32("year", vec![2000])
            .f64("value", vec![100.0])
            .build()
            .unwrap();
        let rows = growth_rows(&faostat_increments(&forestry, &land).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_close(rows[0].loss_per_ha, -5.0);
        assert!(rows[0].gain_per_ha.is_nan());
    }

    #[test]
    fn ipcc_uses_total_row() {
        let df = FrameBuilder::new()
            .str("land_use", vec!["total_forest".into(), "total_forest".into(), "remaining".into()])
            .str("subdivision", vec!["".into(), "Mineral soils".into(), "".into()])
            .i32("year", vec![1990, 1990, 1990])
            .f64("area", vec![2000.0, 1.0, 1.0])
            .f64("biomass_gains", vec![8000.0, 1.0, 1.0])
            .f64("biomass_losses", vec![-6000.0, 1.0, 1.0])
            .f64("biomass_net_change", vec![2000.0, 1.0, 1.0])
            .build()
            .unwrap();
        let rows = growth_rows(&ipcc_increments(&df).unwrap()).unwrap();
        assert_eq!(rows, vec![Growth { year: 1990, gain_per_ha: 4.0, loss_per_ha: -3.0, net_per_ha: 1.0 }]);
    }

    #[test]
    fn cbm_losses_are_negative() {
        let df = FrameBuilder::new()
            .i32("year", vec![2000, 2000])
            .f64("area", vec![50.0, 50.0])
            .f64("gain", vec![300.0, 200.0])
            .f64("loss", vec![100.0, 100.0])
            .build()
            .unwrap();
        let rows = growth_rows(&cbm_increments(&df).unwrap()).unwrap();
        assert_eq!(rows, vec![Growth { year: 2000, gain_per_ha: 5.0, loss_per_ha: -2.0, net_per_ha: 3.0 }]);
    }
}
