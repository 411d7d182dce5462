//! Climate- and area-weighted coefficients per (country, year).
//!
//! Stock and area per forest type are joined, the coefficient of each climatic zone is looked
//! up by stock per hectare and weighted by the country's climatic membership, then the types are
//! combined with their share of the forest area.

use std::collections::BTreeMap;

use polars::prelude::*;

use crate::{
    common::frame::{category_values, f64_values, year_values, FrameBuilder},
    error::Result,
    harmonize::redistribute_unknown,
    tables::{BcefTable, ClimaticWeights, ClimaticZone, ForestType},
};

/// Stock (m³) and area (ha) of one forest type in one year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeRecord {
    pub year: i32,
    pub forest_type: ForestType,
    pub stock: f64,
    pub area: f64,
}

impl TypeRecord {
    /// Stock per hectare; a zero or unknown area gives an unknown value.
    pub fn stock_per_ha(&self) -> f64 {
        if self.area > 0.0 { self.stock / self.area } else { f64::NAN }
    }
}

/// Forest area per type from the SOEF area-by-type table. The unknown "other" area is split
/// equally over the known types.
pub fn area_by_type(df: &DataFrame) -> Result<Vec<(i32, ForestType, f64)>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    let category = category_values(df, "category")?;
    let years = year_values(df, "year")?;
    let columns = ["con", "broad", "mixed", "other"];
    let values = columns.iter().map(|c| f64_values(df, c)).collect::<Result<Vec<_>>>()?;

    let mut out = Vec::new();
    for row in 0..df.height() {
        if category[row] != "forest" { continue }
        let rows: Vec<(&str, f64)> = columns.iter().zip(&values).map(|(c, v)| (*c, v[row])).collect();
        for (label, area) in redistribute_unknown(&rows, &["con", "broad", "mixed"]) {
            if let Some(ft) = ForestType::from_label(&label) {
                out.push((years[row], ft, area));
            }
        }
    }
    Ok(out)
}

fn type_frame(rows: &[(i32, ForestType, f64)], value: &str) -> Result<DataFrame> {
    FrameBuilder::new()
        .i32("year", rows.iter().map(|r| r.0).collect())
        .str("forest_type", rows.iter().map(|r| r.1.as_str().to_string()).collect())
        .f64(value, rows.iter().map(|r| r.2).collect())
        .build()
}

/// Inner join of stock and area on (year, forest type).
pub fn join_stock_and_area(stock: &[(i32, ForestType, f64)], area: &[(i32, ForestType, f64)]) -> Result<Vec<TypeRecord>> {
    let keys = ["year", "forest_type"];
    let joined = type_frame(stock, "stock")?
        .inner_join(&type_frame(area, "area")?, keys, keys)?
        .sort(keys, SortMultipleOptions::default())?;
    let years = year_values(&joined, "year")?;
    let types = category_values(&joined, "forest_type")?;
    let stock = f64_values(&joined, "stock")?;
    let area = f64_values(&joined, "area")?;
    (0..joined.height())
        .map(|i| Ok(TypeRecord { year: years[i], forest_type: ForestType::parse(&types[i])?, stock: stock[i], area: area[i] }))
        .collect()
}

/// Coefficients per year: climate-weighted per type, then area-weighted across types.
///
/// `lookup` returns `n` coefficients for a (zone, type, stock per hectare) triple. Mixed forest
/// has no coefficient row and is left out; types without area carry no weight.
pub fn weighted_coefficients(
    records: &[TypeRecord],
    weights: &ClimaticWeights,
    n: usize,
    lookup: impl Fn(ClimaticZone, ForestType, f64) -> Result<Vec<f64>>,
) -> Result<Vec<(i32, Vec<f64>)>> {
    let mut by_year: BTreeMap<i32, Vec<&TypeRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.forest_type != ForestType::Mixed) {
        by_year.entry(r.year).or_default().push(r);
    }

    let mut out = Vec::with_capacity(by_year.len());
    for (year, rows) in by_year {
        let total_area: f64 = rows.iter().filter(|r| r.area != 0.0).map(|r| r.area).sum();
        let mut combined = vec![0.0; n];
        if !(total_area > 0.0) {
            combined.fill(f64::NAN);
        }
        for r in rows.iter().filter(|r| r.area != 0.0 && total_area > 0.0) {
            let mut per_type = vec![0.0; n];
            for (zone, w) in weights.nonzero() {
                let coef = lookup(zone, r.forest_type, r.stock_per_ha())?;
                for k in 0..n {
                    per_type[k] += w * coef[k];
                }
            }
            let tree_coef = r.area / total_area;
            for k in 0..n {
                combined[k] += tree_coef * per_type[k];
            }
        }
        out.push((year, combined));
    }
    Ok(out)
}

/// bcef_i, bcef_r, bcef_s per year.
pub fn bcef_by_year(records: &[TypeRecord], weights: &ClimaticWeights, table: &BcefTable) -> Result<Vec<(i32, Vec<f64>)>> {
    weighted_coefficients(records, weights, 3, |zone, ft, stock| {
        let b = table.select(zone, ft, stock)?;
        Ok(vec![b.i, b.r, b.s])
    })
}

/// `year` plus one float column per name.
pub fn coefficients_frame(rows: &[(i32, Vec<f64>)], names: &[&str]) -> Result<DataFrame> {
    let mut builder = FrameBuilder::new().i32("year", rows.iter().map(|(y, _)| *y).collect());
    for (k, name) in names.iter().enumerate() {
        builder = builder.f64(name, rows.iter().map(|(_, v)| v[k]).collect());
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::frame::FrameBuilder, tables::Tables, test_util::assert_close};

    fn rec(year: i32, forest_type: ForestType, stock: f64, area: f64) -> TypeRecord {
        TypeRecord { year, forest_type, stock, area }
    }

    #[test]
    fn area_weighted_mean_over_types() {
        let tables = Tables::packaged().unwrap();
        let weights = tables.countries.weights("AT").unwrap();
        // con: 300 m³/ha, last temperate bin; broad: 50 m³/ha.
        let records = [rec(2010, ForestType::Con, 300_000.0, 1000.0), rec(2010, ForestType::Broad, 50_000.0, 1000.0)];
        let rows = bcef_by_year(&records, &weights, &tables.bcef).unwrap();
        assert_eq!(rows.len(), 1);
        let v = &rows[0].1;
        assert_close(v[0], (0.52 + 0.900) / 2.0);
        assert_close(v[1], (0.77 + 1.55) / 2.0);
        assert_close(v[2], (0.70 + 1.40) / 2.0);
    }

    #[test]
    fn climatic_weights_mix_zones() {
        let tables = Tables::packaged().unwrap();
        let weights = tables.countries.weights("BG").unwrap();
        let records = [rec(2000, ForestType::Broad, 5_000.0, 100.0)];
        let rows = bcef_by_year(&records, &weights, &tables.bcef).unwrap();
        assert_close(rows[0].1[0], 0.7 * 0.900 + 0.3 * 0.55);
    }

    #[test]
    fn unknown_stock_or_area_stays_unknown() {
        let tables = Tables::packaged().unwrap();
        let weights = tables.countries.weights("AT").unwrap();
        let records = [rec(2000, ForestType::Con, f64::NAN, 10.0), rec(2000, ForestType::Broad, 500.0, 10.0)];
        let rows = bcef_by_year(&records, &weights, &tables.bcef).unwrap();
        assert!(rows[0].1.iter().all(|v| v.is_nan()));

        let records = [rec(2005, ForestType::Con, 500.0, 0.0), rec(2005, ForestType::Mixed, 500.0, 10.0)];
        let rows = bcef_by_year(&records, &weights, &tables.bcef).unwrap();
        assert!(rows[0].1[2].is_nan());
    }

    #[test]
    fn other_area_is_spread_over_known_types() {
        let df = FrameBuilder::new()
            .str("category", vec!["forest".into(), "other_wooded_land".into()])
            .i32("year", vec![2015, 2015])
            .f64("con", vec![10.0, 1.0])
            .f64("broad", vec![20.0, 1.0])
            .f64("mixed", vec![0.0, 1.0])
            .f64("other", vec![3.0, 1.0])
            .build()
            .unwrap();
        let area = area_by_type(&df).unwrap();
        assert_eq!(area, vec![
            (2015, ForestType::Con, 11.0),
            (2015, ForestType::Broad, 21.0),
            (2015, ForestType::Mixed, 1.0),
        ]);
        let stock = [(2015, ForestType::Con, 110.0), (2010, ForestType::Broad, 5.0)];
        let joined = join_stock_and_area(&stock, &area).unwrap();
        assert_eq!(joined, vec![rec(2015, ForestType::Con, 110.0, 11.0)]);
        assert_close(joined[0].stock_per_ha(), 10.0);
    }
}
