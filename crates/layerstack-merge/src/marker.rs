//! Key-suffix operation markers.

use serde_json::{Map, Value};

use crate::MergePolicy;

/// Operation marker attached to a mapping key (`key.add`, `key.replace`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Merge additively regardless of the section policy.
    Add,
    /// Replace the earlier value wholesale.
    Replace,
}

impl Marker {
    /// The policy this marker forces for its key.
    pub fn policy(self) -> MergePolicy {
        match self {
            Marker::Add => MergePolicy::Merge,
            Marker::Replace => MergePolicy::Replace,
        }
    }
}

const ADD_SUFFIX: &str = ".add";
const REPLACE_SUFFIX: &str = ".replace";

/// Split a raw key into its base name and optional marker.
///
/// A key consisting only of a suffix (`.add`) is left untouched.
pub fn split_marker(key: &str) -> (&str, Option<Marker>) {
    if let Some(base) = key.strip_suffix(ADD_SUFFIX) {
        if !base.is_empty() {
            return (base, Some(Marker::Add));
        }
    }
    if let Some(base) = key.strip_suffix(REPLACE_SUFFIX) {
        if !base.is_empty() {
            return (base, Some(Marker::Replace));
        }
    }
    (key, None)
}

/// Remove markers from every mapping key in a value, recursively.
///
/// When a marked and an unmarked spelling of the same key appear in one
/// mapping, the later one wins.
pub fn strip_markers(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut clean = Map::with_capacity(map.len());
            for (key, child) in map {
                let (base, _) = split_marker(&key);
                let child = strip_markers(child);
                match clean.get_mut(base) {
                    Some(slot) => *slot = child,
                    None => {
                        clean.insert(base.to_string(), child);
                    }
                }
            }
            Value::Object(clean)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_markers).collect()),
        other => other,
    }
}
