use std::collections::HashMap;

use crate::{
    common::frame::{f64_values, read_csv_bytes, str_values},
    error::{PullerError, Result},
};

use super::types::ClimaticZone;

/// Long names used by providers that differ from the country table.
const ALIASES: &[(&str, &str)] = &[
    ("Czechia", "CZ"),
    ("Czech", "CZ"),
    ("UK", "GB"),
    ("United Kingdom of Great Britain and Northern Ireland", "GB"),
    ("Netherlands (Kingdom of the)", "NL"),
    ("Slovak Republic", "SK"),
];

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Fractional membership of a country in each climatic zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimaticWeights {
    pub boreal: f64,
    pub temperate: f64,
    pub mediterranean: f64,
}

impl ClimaticWeights {
    pub fn get(&self, zone: ClimaticZone) -> f64 {
        match zone {
            ClimaticZone::Boreal => self.boreal,
            ClimaticZone::Temperate => self.temperate,
            ClimaticZone::Mediterranean => self.mediterranean,
        }
    }

    /// Zones with a non-zero weight.
    pub fn nonzero(&self) -> impl Iterator<Item = (ClimaticZone, f64)> + '_ {
        ClimaticZone::ALL.into_iter().map(|z| (z, self.get(z))).filter(|(_, w)| *w > 0.0)
    }

    pub fn sum(&self) -> f64 { self.boreal + self.temperate + self.mediterranean }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryInfo {
    pub name: String,
    pub iso2: String,
    pub iso3: String,
    pub weights: ClimaticWeights,
}

/// The packaged country table: codes, long names and climatic weights.
#[derive(Debug, Clone)]
pub struct CountryTable {
    countries: Vec<CountryInfo>,
    by_iso2: HashMap<String, usize>,
    by_iso3: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl CountryTable {
    pub fn from_csv(text: &str) -> Result<Self> {
        let df = read_csv_bytes(text.as_bytes())?;
        let names = str_values(&df, "country")?;
        let iso2 = str_values(&df, "iso2_code")?;
        let iso3 = str_values(&df, "iso3_code")?;
        let boreal = f64_values(&df, "boreal")?;
        let temperate = f64_values(&df, "temperate")?;
        let mediterranean = f64_values(&df, "mediterranean")?;

        let mut countries = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let (Some(name), Some(iso2), Some(iso3)) = (&names[row], &iso2[row], &iso3[row]) else {
                return Err(PullerError::config(format!("country table row {row} is incomplete")));
            };
            let weights = ClimaticWeights {
                boreal: boreal[row],
                temperate: temperate[row],
                mediterranean: mediterranean[row],
            };
            let in_range = [weights.boreal, weights.temperate, weights.mediterranean]
                .iter()
                .all(|w| (0.0..=1.0).contains(w));
            if !in_range || (weights.sum() - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(PullerError::config(format!("climatic weights of {iso2} do not sum to 1")));
            }
            countries.push(CountryInfo { name: name.clone(), iso2: iso2.clone(), iso3: iso3.clone(), weights });
        }
        Self::new(countries)
    }

    fn new(countries: Vec<CountryInfo>) -> Result<Self> {
        let mut by_iso2 = HashMap::new();
        let mut by_iso3 = HashMap::new();
        let mut by_name = HashMap::new();
        for (i, c) in countries.iter().enumerate() {
            if by_iso2.insert(c.iso2.clone(), i).is_some() {
                return Err(PullerError::config(format!("duplicate country {}", c.iso2)));
            }
            by_iso3.insert(c.iso3.clone(), i);
            by_name.insert(c.name.clone(), i);
        }
        for (alias, iso2) in ALIASES {
            if let Some(&i) = by_iso2.get(*iso2) {
                by_name.entry(alias.to_string()).or_insert(i);
            }
        }
        Ok(Self { countries, by_iso2, by_iso3, by_name })
    }

    pub fn all(&self) -> &[CountryInfo] { &self.countries }

    pub fn iso2_codes(&self) -> Vec<String> {
        self.countries.iter().map(|c| c.iso2.clone()).collect()
    }

    pub fn by_iso2(&self, iso2: &str) -> Option<&CountryInfo> {
        self.by_iso2.get(iso2).map(|&i| &self.countries[i])
    }

    pub fn by_iso3(&self, iso3: &str) -> Option<&CountryInfo> {
        self.by_iso3.get(iso3).map(|&i| &self.countries[i])
    }

    /// Long name (or a known provider alias) to country.
    pub fn by_name(&self, name: &str) -> Option<&CountryInfo> {
        self.by_name.get(name.trim()).map(|&i| &self.countries[i])
    }

    pub fn weights(&self, iso2: &str) -> Result<ClimaticWeights> {
        self.by_iso2(iso2)
            .map(|c| c.weights)
            .ok_or_else(|| PullerError::UnknownCountry(iso2.to_string()))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn packaged() -> CountryTable {
        CountryTable::from_csv(include_str!("../../data/country_codes.csv")).unwrap()
    }

    #[test]
    fn lookups_agree() {
        let table = packaged();
        let cz = table.by_name("Czechia").unwrap();
        assert_eq!(cz.iso2, "CZ");
        assert_eq!(table.by_iso3("CZE").unwrap(), cz);
        assert_eq!(table.by_name("Czech Republic").unwrap(), cz);
        assert_eq!(table.by_name("UK").unwrap().iso2, "GB");
        assert!(table.by_iso2("US").is_none());
    }

    #[test]
    fn every_country_weights_sum_to_one() {
        let table = packaged();
        for c in table.all() {
            assert!((c.weights.sum() - 1.0).abs() < 1e-9, "{}", c.iso2);
        }
        let se = table.weights("SE").unwrap();
        assert_eq!(se.nonzero().count(), 2);
        assert!(matches!(table.weights("XX"), Err(PullerError::UnknownCountry(_))));
    }

    #[test]
    fn bad_weights_are_rejected() {
        let csv = "country,iso2_code,iso3_code,boreal,temperate,mediterranean\nAtlantis,AA,AAA,0.5,0.4,0.0\n";
        assert!(matches!(CountryTable::from_csv(csv), Err(PullerError::Configuration(_))));
    }
}
