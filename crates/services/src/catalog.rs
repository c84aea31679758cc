use std::collections::BTreeMap;
use std::sync::Arc;

use persona_core::model::{AssessmentDefinition, AssessmentDraft, AssessmentId};
use serde::Deserialize;

use crate::error::CatalogError;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    assessments: Vec<AssessmentDraft>,
}

/// Read-only set of assessment definitions, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AssessmentCatalog {
    entries: BTreeMap<AssessmentId, Arc<AssessmentDefinition>>,
}

impl AssessmentCatalog {
    /// Parse a catalog document of the form `{"assessments": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` on malformed JSON, invalid definitions, or
    /// repeated assessment ids.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let definitions = file
            .assessments
            .into_iter()
            .map(AssessmentDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_definitions(definitions)
    }

    /// Build a catalog from already validated definitions.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateAssessment` if two definitions share an id.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = AssessmentDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut entries = BTreeMap::new();
        for definition in definitions {
            let id = definition.id().clone();
            if entries.contains_key(&id) {
                return Err(CatalogError::DuplicateAssessment(id));
            }
            entries.insert(id, Arc::new(definition));
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn get(&self, id: &AssessmentId) -> Option<Arc<AssessmentDefinition>> {
        self.entries.get(id).cloned()
    }

    /// All definitions, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<AssessmentDefinition>> {
        self.entries.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
