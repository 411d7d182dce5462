//! Volume increments to tons of carbon (IPCC 2006 vol. 4, equations 2.10 and 2.12).

use std::collections::BTreeMap;

use polars::frame::DataFrame;

use crate::{
    common::frame::{f64_values, year_values, FrameBuilder},
    error::Result,
};

use super::increments::growth_rows;

/// Gain in t C/ha from a volume gain in m³/ha.
pub fn convert_gain_tc(gain_per_ha: f64, bcef_i: f64, root_ratio: f64, carbon_fraction: f64) -> f64 {
    gain_per_ha * bcef_i * (1.0 + root_ratio) * carbon_fraction
}

/// Loss in t C/ha from a volume loss in m³/ha; keeps the (negative) sign.
pub fn convert_loss_tc(loss_per_ha: f64, bcef_r: f64, root_ratio: f64, carbon_fraction: f64) -> f64 {
    loss_per_ha * bcef_r * (1.0 + root_ratio) * carbon_fraction
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonGrowth {
    pub year: i32,
    pub gain_per_ha_tc: f64,
    pub loss_per_ha_tc: f64,
    pub net_per_ha_tc: f64,
}

/// Carbon increments of one country.
///
/// `increments` is a growth frame in m³/ha; `bcef` (year, bcef_i, bcef_r, ...) and `root_ratio`
/// (year, root_ratio) are joined on the exact year, so pass interpolated series to cover every
/// year of a yearly source. Net is recomputed from the converted gain and loss.
pub fn carbon_increments(
    increments: &DataFrame,
    bcef: &DataFrame,
    root_ratio: &DataFrame,
    carbon_fraction: f64,
) -> Result<Vec<CarbonGrowth>> {
    let bcef_i = by_year(bcef, "bcef_i")?;
    let bcef_r = by_year(bcef, "bcef_r")?;
    let ratio = by_year(root_ratio, "root_ratio")?;

    Ok(growth_rows(increments)?
        .into_iter()
        .filter_map(|g| {
            let (bi, br, r) = (bcef_i.get(&g.year)?, bcef_r.get(&g.year)?, ratio.get(&g.year)?);
            let gain = convert_gain_tc(g.gain_per_ha, *bi, *r, carbon_fraction);
            let loss = convert_loss_tc(g.loss_per_ha, *br, *r, carbon_fraction);
            Some(CarbonGrowth { year: g.year, gain_per_ha_tc: gain, loss_per_ha_tc: loss, net_per_ha_tc: gain + loss })
        })
        .collect())
}

pub fn carbon_frame(rows: &[CarbonGrowth]) -> Result<DataFrame> {
    FrameBuilder::new()
        .i32("year", rows.iter().map(|c| c.year).collect())
        .f64("gain_per_ha_tc", rows.iter().map(|c| c.gain_per_ha_tc).collect())
        .f64("loss_per_ha_tc", rows.iter().map(|c| c.loss_per_ha_tc).collect())
        .f64("net_per_ha_tc", rows.iter().map(|c| c.net_per_ha_tc).collect())
        .build()
}

fn by_year(df: &DataFrame, column: &str) -> Result<BTreeMap<i32, f64>> {
    if df.height() == 0 {
        return Ok(BTreeMap::new());
    }
    let years = year_values(df, "year")?;
    let values = f64_values(df, column)?;
    Ok(years.into_iter().zip(values).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DEFAULT_CARBON_FRACTION, derive::increments::{growth_frame, Growth}, test_util::assert_close};

    #[test]
    fn equations_and_exact_year_join() {
        let increments = growth_frame(&[
            Growth::from_gain_loss(2010, 6.0, -4.0),
            Growth::from_gain_loss(2011, 6.0, -4.0),
        ]).unwrap();
        let bcef = FrameBuilder::new()
            .i32("year", vec![2010])
            .f64("bcef_i", vec![0.9])
            .f64("bcef_r", vec![1.5])
            .f64("bcef_s", vec![1.4])
            .build()
            .unwrap();
        let roots = FrameBuilder::new().i32("year", vec![2010]).f64("root_ratio", vec![0.25]).build().unwrap();

        let rows = carbon_increments(&increments, &bcef, &roots, DEFAULT_CARBON_FRACTION).unwrap();
        assert_eq!(rows.len(), 1);
        let c = rows[0];
        assert_close(c.gain_per_ha_tc, 6.0 * 0.9 * 1.25 * 0.47);
        assert_close(c.loss_per_ha_tc, -4.0 * 1.5 * 1.25 * 0.47);
        assert_close(c.net_per_ha_tc, c.gain_per_ha_tc + c.loss_per_ha_tc);
        assert!(c.loss_per_ha_tc <= 0.0);
    }
}
