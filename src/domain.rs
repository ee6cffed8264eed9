//! Domain merge
//!
//! Domains merge through the generic engine with a section policy table:
//! name sets (`intents`, `entities`, `actions`, `e2e_actions`) union, every
//! response variant list is replaced wholesale by the highest layer that
//! defines it, and the mapping sections (`slots`, `forms`,
//! `session_config`) deep-merge.

use layerstack_merge::{MergePolicy, Merger, PolicyTable};
use serde_json::Value;

use crate::loader::LayerDocument;

/// Built-in domain section policies.
pub fn default_domain_policies() -> PolicyTable {
    PolicyTable::new()
        .with_rule("intents", MergePolicy::Merge)
        .with_rule("entities", MergePolicy::Merge)
        .with_rule("actions", MergePolicy::Merge)
        .with_rule("e2e_actions", MergePolicy::Merge)
        .with_rule("responses.*", MergePolicy::Replace)
        .with_rule("slots", MergePolicy::Merge)
        .with_rule("forms", MergePolicy::Merge)
        .with_rule("session_config", MergePolicy::Merge)
}

/// Merge domain documents in precedence order, every part in file order.
pub fn merge_domain<'a, I>(merger: &Merger, documents: I) -> Value
where
    I: IntoIterator<Item = &'a LayerDocument>,
{
    merger.merge(documents.into_iter().flat_map(|doc| doc.values().cloned()))
}
