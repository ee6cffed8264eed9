//! layerstack - layered overlay merge engine
//!
//! Composes a conversational-assistant project out of independently
//! maintained layers. Each layer is a directory holding partial domain,
//! NLU, story and rule documents plus optional single-file configs; the
//! engine resolves the ordered layer list, loads every document, merges
//! them under per-section policies, consolidates entities and synonyms,
//! selects the pipeline config, endpoints and credentials, and exports the
//! result.

pub mod consolidate;
pub mod domain;
pub mod error;
pub mod export;
pub mod layer;
pub mod loader;
pub mod nlu;
pub mod pipeline;
pub mod report;
pub mod select;
pub mod settings;
pub mod stories;

pub use error::{ExitCode, PipelineError};
pub use layer::{Layer, LayerCandidate, LayerRole};
pub use loader::DocumentKind;
pub use pipeline::{MergeResult, Pipeline};
pub use settings::{EffectiveSettings, Settings};
