use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::error::{PullerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClimaticZone {
    Boreal,
    Temperate,
    Mediterranean,
}

impl ClimaticZone {
    pub const ALL: [ClimaticZone; 3] = [ClimaticZone::Boreal, ClimaticZone::Temperate, ClimaticZone::Mediterranean];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClimaticZone::Boreal => "boreal",
            ClimaticZone::Temperate => "temperate",
            ClimaticZone::Mediterranean => "mediterranean",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boreal" => Ok(ClimaticZone::Boreal),
            "temperate" => Ok(ClimaticZone::Temperate),
            "mediterranean" => Ok(ClimaticZone::Mediterranean),
            other => Err(PullerError::config(format!("unknown climatic zone '{other}'"))),
        }
    }
}

impl fmt::Display for ClimaticZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForestType {
    Con,    // Coniferous
    Broad,  // Broadleaved
    Mixed,  // Not assignable to a coefficient row
}

/// Provider synonyms collapsed onto the canonical forest types, tried in order.
static FOREST_TYPE_REWRITES: LazyLock<Vec<(Regex, ForestType)>> = LazyLock::new(|| {
    [
        (r"^hardwoods?$", ForestType::Broad),
        (r"^broad(leaved|leaf)?$", ForestType::Broad),
        (r"^firs and spruces$", ForestType::Con),
        (r"^.*conifers$", ForestType::Con),
        (r"^con(iferous)?$", ForestType::Con),
        (r"^mixed$", ForestType::Mixed),
    ]
    .into_iter()
    .map(|(re, ft)| (Regex::new(re).expect("static regex"), ft))
    .collect()
});

impl ForestType {
    pub const ALL: [ForestType; 3] = [ForestType::Con, ForestType::Broad, ForestType::Mixed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForestType::Con => "con",
            ForestType::Broad => "broad",
            ForestType::Mixed => "mixed",
        }
    }

    /// Canonical type of a provider label ("hardwoods", "other conifers", "con", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let norm = label.trim().to_ascii_lowercase();
        FOREST_TYPE_REWRITES.iter().find(|(re, _)| re.is_match(&norm)).map(|(_, ft)| *ft)
    }

    pub fn parse(label: &str) -> Result<Self> {
        Self::from_label(label).ok_or_else(|| PullerError::config(format!("unknown forest type '{label}'")))
    }
}

impl fmt::Display for ForestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeciesKind {
    Conifer,
    Broad,
}

impl SpeciesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeciesKind::Conifer => "conifer",
            SpeciesKind::Broad => "broad",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "conifer" => Ok(SpeciesKind::Conifer),
            "broad" => Ok(SpeciesKind::Broad),
            other => Err(PullerError::config(format!("unknown species kind '{other}'"))),
        }
    }

    pub fn forest_type(&self) -> ForestType {
        match self {
            SpeciesKind::Conifer => ForestType::Con,
            SpeciesKind::Broad => ForestType::Broad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forest_type_rewrites() {
        assert_eq!(ForestType::from_label("hardwoods"), Some(ForestType::Broad));
        assert_eq!(ForestType::from_label("Firs and spruces"), Some(ForestType::Con));
        assert_eq!(ForestType::from_label("other conifers"), Some(ForestType::Con));
        assert_eq!(ForestType::from_label("conifers"), Some(ForestType::Con));
        assert_eq!(ForestType::from_label("mixed"), Some(ForestType::Mixed));
        assert_eq!(ForestType::from_label("pines"), None);
    }

    #[test]
    fn zones_roundtrip() {
        for zone in ClimaticZone::ALL {
            assert_eq!(ClimaticZone::parse(zone.as_str()).unwrap(), zone);
        }
        assert!(ClimaticZone::parse("tropical").is_err());
    }
}
