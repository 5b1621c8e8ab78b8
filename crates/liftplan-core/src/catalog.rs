//! Exercise catalog and fuzzy name resolution
//!
//! Free-text exercise descriptions (typed inline or imported from CSV) are
//! matched to catalog entries in three passes, first hit wins:
//! 1. exact match, case-insensitive
//! 2. the description contains a catalog name
//! 3. a catalog name contains the description
//!
//! Anything else stays unresolved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the shared exercise catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub catalog_id: String,
    pub name: String,
    #[serde(default)]
    pub motion: Option<String>,
    #[serde(default)]
    pub target_area: Option<String>,
}

/// Description that could not be matched against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no catalog exercise matches '{description}'")]
pub struct ResolutionError {
    pub description: String,
}

/// In-memory catalog used for resolution
#[derive(Debug, Clone, Default)]
pub struct ExerciseCatalog {
    entries: Vec<CatalogEntry>,
    /// Lowercased names, parallel to `entries`
    folded: Vec<String>,
}

impl ExerciseCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let folded = entries.iter().map(|e| fold(&e.name)).collect();
        Self { entries, folded }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, catalog_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.catalog_id == catalog_id)
    }

    /// Match free text against the catalog
    pub fn resolve(&self, description: &str) -> Option<&CatalogEntry> {
        let needle = fold(description);
        if needle.is_empty() {
            return None;
        }

        let named = || {
            self.entries
                .iter()
                .zip(&self.folded)
                .filter(|(_, name)| !name.is_empty())
        };

        named()
            .find(|(_, name)| **name == needle)
            .or_else(|| named().find(|(_, name)| needle.contains(name.as_str())))
            .or_else(|| named().find(|(_, name)| name.contains(needle.as_str())))
            .map(|(entry, _)| entry)
    }

    /// Like [`resolve`](Self::resolve) but reports the failing text
    pub fn require(&self, description: &str) -> Result<&CatalogEntry, ResolutionError> {
        self.resolve(description).ok_or_else(|| ResolutionError {
            description: description.trim().to_string(),
        })
    }
}

fn fold(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            catalog_id: id.to_string(),
            name: name.to_string(),
            motion: Some("push".to_string()),
            target_area: None,
        }
    }

    fn catalog() -> ExerciseCatalog {
        ExerciseCatalog::new(vec![
            entry("c1", "Bench Press"),
            entry("c2", "Incline Bench Press"),
            entry("c3", "Back Squat"),
        ])
    }

    #[test]
    fn test_exact_match_wins_over_containment() {
        let catalog = catalog();
        // "incline bench press" contains "bench press" but the exact pass runs first
        assert_eq!(catalog.resolve("INCLINE bench press").unwrap().catalog_id, "c2");
    }

    #[test]
    fn test_description_containing_catalog_name() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("Paused Back Squat").unwrap().catalog_id, "c3");
    }

    #[test]
    fn test_catalog_name_containing_description() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("squat").unwrap().catalog_id, "c3");
    }

    #[test]
    fn test_unresolved_and_blank() {
        let catalog = catalog();
        assert!(catalog.resolve("Deadlift").is_none());
        assert!(catalog.resolve("   ").is_none());
        let err = catalog.require(" Deadlift ").unwrap_err();
        assert_eq!(err.description, "Deadlift");
    }
}
