use crate::{
    error::Result,
    tables::{BcefTable, ClimaticWeights, RootRatioTable},
};

use super::bcef::{weighted_coefficients, TypeRecord};

/// Root-to-shoot ratio per year.
///
/// The ratio bins are expressed in above-ground biomass (t/ha), so the merchantable stock per
/// hectare is first expanded with the zone's `bcef_s`.
pub fn root_ratio_by_year(
    records: &[TypeRecord],
    weights: &ClimaticWeights,
    bcef: &BcefTable,
    roots: &RootRatioTable,
) -> Result<Vec<(i32, Vec<f64>)>> {
    weighted_coefficients(records, weights, 1, |zone, ft, stock_per_ha| {
        let agb = stock_per_ha * bcef.select(zone, ft, stock_per_ha)?.s;
        Ok(vec![roots.select(zone, ft, agb)?])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tables::{ForestType, Tables}, test_util::assert_close};

    #[test]
    fn ratio_is_selected_by_above_ground_biomass() {
        let tables = Tables::packaged().unwrap();
        let weights = tables.countries.weights("AT").unwrap();
        // 50 m³/ha of broadleaves: bcef_s 1.40 gives 70 t/ha, bin (50, 75] has 0.46.
        // 150 m³/ha of conifers: bcef_s 0.75 gives 112.5 t/ha, bin (75, 150] has 0.29.
        let records = [
            TypeRecord { year: 2010, forest_type: ForestType::Broad, stock: 5_000.0, area: 100.0 },
            TypeRecord { year: 2010, forest_type: ForestType::Con, stock: 45_000.0, area: 300.0 },
        ];
        let rows = root_ratio_by_year(&records, &weights, &tables.bcef, &tables.root_ratio).unwrap();
        assert_close(rows[0].1[0], 0.25 * 0.46 + 0.75 * 0.29);
    }
}
