//! Entity and synonym consolidation
//!
//! Runs after the merge over the per-layer declarations, so a conflict can
//! name both contributing layers. Conflicts are fatal.

mod entities;
mod synonyms;

pub use entities::{consolidate_entities, EntityRecord, EntityRegistry};
pub use synonyms::{consolidate_synonyms, SynonymTable};

/// Consolidation conflicts
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error(
        "entity '{entity}' has conflicting types: '{first_type}' in layer {first_layer}, \
         '{second_type}' in layer {second_layer}"
    )]
    EntityType {
        entity: String,
        first_layer: usize,
        first_type: String,
        second_layer: usize,
        second_type: String,
    },

    #[error(
        "ambiguous synonym '{surface}': maps to '{first_canonical}' in layer {first_layer} \
         and to '{second_canonical}' in layer {second_layer}"
    )]
    AmbiguousSynonym {
        surface: String,
        first_canonical: String,
        first_layer: usize,
        second_canonical: String,
        second_layer: usize,
    },
}

impl ConflictError {
    /// Layers involved in the conflict, lower first.
    pub fn layers(&self) -> (usize, usize) {
        let (a, b) = match self {
            ConflictError::EntityType {
                first_layer,
                second_layer,
                ..
            }
            | ConflictError::AmbiguousSynonym {
                first_layer,
                second_layer,
                ..
            } => (*first_layer, *second_layer),
        };
        (a.min(b), a.max(b))
    }
}
