use std::collections::BTreeMap;

use crate::{
    common::frame::{f64_values, read_csv_bytes, str_values, MISSING},
    error::{PullerError, Result},
};

use super::types::SpeciesKind;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesInfo {
    pub genus: String,
    pub species: String,
    /// Basic wood density, kg/m³.
    pub density: f64,
    pub kind: SpeciesKind,
    pub plot_color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenusInfo {
    pub kind: SpeciesKind,
    pub mean_density: f64,
    pub plot_color: String,
}

#[derive(Debug, Clone)]
pub struct SpeciesTable {
    species: Vec<SpeciesInfo>,
    genera: BTreeMap<String, GenusInfo>,
}

impl SpeciesTable {
    pub fn from_csv(text: &str) -> Result<Self> {
        let df = read_csv_bytes(text.as_bytes())?;
        let genus = str_values(&df, "genus")?;
        let species = str_values(&df, "species")?;
        let density = f64_values(&df, "density")?;
        let kind = str_values(&df, "kind")?;
        let color = str_values(&df, "plot_color")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (Some(g), Some(s), Some(k)) = (&genus[i], &species[i], &kind[i]) else {
                return Err(PullerError::config(format!("species table row {i} is incomplete")));
            };
            if !(density[i] > 0.0) {
                return Err(PullerError::config(format!("density of {g} {s} must be positive")));
            }
            rows.push(SpeciesInfo {
                genus: g.clone(),
                species: s.clone(),
                density: density[i],
                kind: SpeciesKind::parse(k)?,
                plot_color: color[i].clone().unwrap_or_default(),
            });
        }

        let mut genera: BTreeMap<String, (GenusInfo, usize)> = BTreeMap::new();
        for s in &rows {
            let entry = genera.entry(s.genus.clone()).or_insert_with(|| {
                (GenusInfo { kind: s.kind, mean_density: 0.0, plot_color: s.plot_color.clone() }, 0)
            });
            if entry.0.kind != s.kind {
                return Err(PullerError::config(format!("genus {} mixes conifers and broadleaves", s.genus)));
            }
            entry.0.mean_density += s.density;
            entry.1 += 1;
        }
        let genera = genera
            .into_iter()
            .map(|(g, (mut info, n))| {
                info.mean_density /= n as f64;
                (g, info)
            })
            .collect();

        Ok(Self { species: rows, genera })
    }

    pub fn species(&self) -> &[SpeciesInfo] { &self.species }

    pub fn genera(&self) -> impl Iterator<Item = &str> { self.genera.keys().map(String::as_str) }

    pub fn genus(&self, genus: &str) -> Option<&GenusInfo> { self.genera.get(genus) }

    /// Genus of a scientific name ("Picea abies" -> "Picea"); `missing` for unknown genera.
    pub fn genus_of(&self, scientific_name: &str) -> String {
        let first = scientific_name.split_whitespace().next().unwrap_or("");
        let mut chars = first.chars();
        let capitalised: String = match chars.next() {
            Some(c) => c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        };
        if self.genera.contains_key(&capitalised) { capitalised } else { MISSING.to_string() }
    }

    pub fn kind_of_genus(&self, genus: &str) -> Option<SpeciesKind> {
        self.genera.get(genus).map(|g| g.kind)
    }
}
