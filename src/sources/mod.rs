//! Source adapters that turn a codex tree or the Graph API into entities

pub mod filesystem;
pub mod graphapi;
pub mod tables;

use std::collections::HashMap;

use crate::entity::Entity;
use crate::error::{IndexError, IndexWarning};

pub use filesystem::FilesystemSource;
pub use graphapi::GraphApiSource;

/// Entities from one source plus everything that was skipped along the way
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub entities: Vec<Entity>,
    pub warnings: Vec<IndexWarning>,
}

impl SourceBatch {
    /// Add an entity unless its id was already taken; the first one stays
    pub fn push_unique(&mut self, entity: Entity, seen: &mut HashMap<String, String>) {
        if let Some(kept) = seen.get(&entity.id) {
            let error = IndexError::DuplicateId {
                id: entity.id.clone(),
                kept: kept.clone(),
                duplicate: entity.location(),
            };
            tracing::warn!("{}", error);
            self.warnings
                .push(IndexWarning::from_error(entity.location(), &error));
            return;
        }
        seen.insert(entity.id.clone(), entity.location());
        self.entities.push(entity);
    }

    pub fn skip(&mut self, location: impl Into<String>, error: &IndexError) {
        let location = location.into();
        tracing::warn!("Skipping {}: {}", location, error);
        self.warnings.push(IndexWarning::from_error(location, error));
    }
}
