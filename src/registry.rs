use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of performance categories tracked per district.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "NBW")]
    Nbw,
    Conviction,
    Narcotics,
    #[serde(rename = "Missing Person")]
    MissingPerson,
    Firearms,
    #[serde(rename = "Sand Mining")]
    SandMining,
    #[serde(rename = "Preventive Actions")]
    PreventiveActions,
    #[serde(rename = "Important Detections")]
    ImportantDetections,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Nbw,
        Category::Conviction,
        Category::Narcotics,
        Category::MissingPerson,
        Category::Firearms,
        Category::SandMining,
        Category::PreventiveActions,
        Category::ImportantDetections,
    ];

    /// The tag stored with each record.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Nbw => "NBW",
            Category::Conviction => "Conviction",
            Category::Narcotics => "Narcotics",
            Category::MissingPerson => "Missing Person",
            Category::Firearms => "Firearms",
            Category::SandMining => "Sand Mining",
            Category::PreventiveActions => "Preventive Actions",
            Category::ImportantDetections => "Important Detections",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Nbw => "NBW Execution",
            Category::Conviction => "Conviction Ratio",
            Category::Narcotics => "Narcotic Seizures",
            Category::MissingPerson => "Missing Persons Traced",
            Category::Firearms => "Firearms Seized",
            Category::SandMining => "Illegal Sand Mining Cases",
            Category::PreventiveActions => "Preventive Actions Taken",
            Category::ImportantDetections => "Important Detections",
        }
    }

    /// Position of the category in [`Category::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Matches a tag exactly, ignoring surrounding whitespace and letter case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCategory(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read district registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse district registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("district registry is empty")]
    Empty,
    #[error("duplicate district id {0}")]
    DuplicateId(i32),
    #[error("duplicate district name {0:?}")]
    DuplicateName(String),
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    districts: Vec<District>,
}

/// Immutable district table loaded once at startup and handed to the
/// normalizer, importer and aggregation functions.
///
/// Iteration order is the configured order; the leaderboard relies on it to
/// break ties.
#[derive(Debug, Clone)]
pub struct Registry {
    districts: Vec<District>,
}

impl Registry {
    pub fn new(districts: Vec<District>) -> Result<Self, RegistryError> {
        if districts.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for district in &districts {
            if !ids.insert(district.id) {
                return Err(RegistryError::DuplicateId(district.id));
            }
            if !names.insert(district.name.trim().to_lowercase()) {
                return Err(RegistryError::DuplicateName(district.name.clone()));
            }
        }

        Ok(Self { districts })
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        Self::new(file.districts)
    }

    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn by_id(&self, id: i32) -> Option<&District> {
        self.districts.iter().find(|district| district.id == id)
    }

    /// Exact name match after trimming, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<&District> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.districts
            .iter()
            .find(|district| district.name.trim().to_lowercase() == wanted)
    }

    pub fn is_valid_category(&self, tag: &str) -> bool {
        tag.parse::<Category>().is_ok()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let districts = [
            (1, "Ganjam"),
            (2, "Cuttack"),
            (3, "Bhubaneswar"),
            (4, "Puri"),
            (5, "Sambalpur"),
            (6, "Rourkela"),
        ]
        .into_iter()
        .map(|(id, name)| District {
            id,
            name: name.to_string(),
        })
        .collect();

        Self { districts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_id_and_name() {
        let registry = Registry::default();
        assert_eq!(registry.by_id(4).map(|d| d.name.as_str()), Some("Puri"));
        assert!(registry.by_id(99).is_none());
        assert_eq!(registry.by_name("  cuTTack ").map(|d| d.id), Some(2));
        assert!(registry.by_name("Cutt").is_none());
        assert!(registry.by_name("   ").is_none());
    }

    #[test]
    fn categories_parse_from_tags_only() {
        assert_eq!("NBW".parse::<Category>(), Ok(Category::Nbw));
        assert_eq!(
            " missing person ".parse::<Category>(),
            Ok(Category::MissingPerson)
        );
        assert!("NBW Execution".parse::<Category>().is_err());

        let registry = Registry::default();
        assert!(registry.is_valid_category("Sand Mining"));
        assert!(!registry.is_valid_category("Traffic"));
    }

    #[test]
    fn category_indices_follow_declaration_order() {
        for (position, category) in Category::ALL.iter().enumerate() {
            assert_eq!(category.index(), position);
        }
    }

    #[test]
    fn loads_registry_from_json() {
        let registry =
            Registry::from_json(r#"{"districts":[{"id":10,"name":"Koraput"},{"id":11,"name":"Balasore"}]}"#)
                .expect("registry");
        assert_eq!(registry.districts().len(), 2);
        assert_eq!(registry.by_name("balasore").map(|d| d.id), Some(11));
    }

    #[test]
    fn rejects_duplicate_districts() {
        let duplicate_id = Registry::new(vec![
            District { id: 1, name: "A".into() },
            District { id: 1, name: "B".into() },
        ]);
        assert!(matches!(duplicate_id, Err(RegistryError::DuplicateId(1))));

        let duplicate_name = Registry::new(vec![
            District { id: 1, name: "Puri".into() },
            District { id: 2, name: "puri".into() },
        ]);
        assert!(matches!(duplicate_name, Err(RegistryError::DuplicateName(_))));

        assert!(matches!(Registry::new(Vec::new()), Err(RegistryError::Empty)));
    }
}
