//! Static reference data shipped with the crate.
//!
//! Everything here is parsed once from the CSVs under `data/` and is immutable afterwards.

pub mod coefficients;
pub mod countries;
pub mod names;
pub mod species;
pub mod types;

pub use coefficients::{Bcef, BcefTable, CoefficientRow, CoefficientTable, RootRatioTable, StockBin};
pub use countries::{ClimaticWeights, CountryInfo, CountryTable};
pub use names::{ColumnMap, ColumnRename, NameMaps, RowMap};
pub use species::{GenusInfo, SpeciesInfo, SpeciesTable};
pub use types::{ClimaticZone, ForestType, SpeciesKind};

use crate::error::Result;

const COUNTRY_CODES: &str = include_str!("../../data/country_codes.csv");
const BCEF_BOREAL: &str = include_str!("../../data/bcef_boreal.csv");
const BCEF_TEMPERATE: &str = include_str!("../../data/bcef_temperate.csv");
const BCEF_MEDITERRANEAN: &str = include_str!("../../data/bcef_mediterranean.csv");
const ROOT_RATIO: &str = include_str!("../../data/root_ratio.csv");
const SPECIES_INFO: &str = include_str!("../../data/species_info.csv");
const COLUMN_NAMES: &str = include_str!("../../data/column_names.csv");
const ROW_NAMES: &str = include_str!("../../data/row_names.csv");

/// Every packaged table, loaded together.
#[derive(Debug, Clone)]
pub struct Tables {
    pub countries: CountryTable,
    pub bcef: BcefTable,
    pub root_ratio: RootRatioTable,
    pub species: SpeciesTable,
    pub names: NameMaps,
}

impl Tables {
    pub fn packaged() -> Result<Self> {
        Ok(Self {
            countries: CountryTable::from_csv(COUNTRY_CODES)?,
            bcef: BcefTable::from_csvs(BCEF_BOREAL, BCEF_TEMPERATE, BCEF_MEDITERRANEAN)?,
            root_ratio: RootRatioTable::from_csv(ROOT_RATIO)?,
            species: SpeciesTable::from_csv(SPECIES_INFO)?,
            names: NameMaps::from_csvs(COLUMN_NAMES, ROW_NAMES)?,
        })
    }
}
