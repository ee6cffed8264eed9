//! Deterministic, policy-driven deep merge for layered documents.
//!
//! Documents are `serde_json::Value` trees (YAML is loaded into the same
//! model). A [`Merger`] folds an ordered sequence of documents into one:
//!
//! - Mappings merge recursively by key
//! - Sequences follow the [`MergePolicy`] registered for their section path
//! - Scalars: later document wins
//! - `null` / absent: the present value wins
//!
//! Keys may carry an operation marker (`intents.replace`, `responses.add`)
//! that overrides the policy for that key in that one document.

mod marker;
mod merge;
mod policy;

pub use marker::{split_marker, strip_markers, Marker};
pub use merge::{item_name, Merger};
pub use policy::{MergePolicy, PolicyError, PolicyTable};
