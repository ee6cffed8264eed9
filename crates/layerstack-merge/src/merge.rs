//! Recursive merge of ordered documents.

use std::mem;

use serde_json::{Map, Value};

use crate::marker::{split_marker, strip_markers, Marker};
use crate::policy::{MergePolicy, PolicyTable};

/// Folds an ordered sequence of documents into one.
///
/// Merge semantics:
/// - Mappings: merge by key. Existing keys keep their position, new keys
///   are appended in the order the later document declares them
/// - Sequences: `Merge` concatenates and deduplicates by identity
///   (first occurrence keeps its position), `Append` concatenates,
///   `Replace` takes the later sequence
/// - Scalars and mismatched types: later document wins
/// - `null`: contributes nothing, the earlier value is kept
///
/// Unlisted mapping and sequence paths use `Merge`.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    policies: PolicyTable,
}

impl Merger {
    pub fn new(policies: PolicyTable) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Merge documents in order (first is the base, last has highest precedence).
    pub fn merge<I>(&self, documents: I) -> Value
    where
        I: IntoIterator<Item = Value>,
    {
        documents
            .into_iter()
            .fold(Value::Null, |merged, doc| self.merge_pair(merged, doc))
    }

    /// Merge a single overlay document onto a base document.
    pub fn merge_pair(&self, base: Value, overlay: Value) -> Value {
        let mut path = Vec::new();
        self.merge_at(&mut path, base, overlay, None)
    }

    fn merge_at(
        &self,
        path: &mut Vec<String>,
        base: Value,
        overlay: Value,
        forced: Option<MergePolicy>,
    ) -> Value {
        if overlay.is_null() {
            return base;
        }

        let policy = forced
            .or_else(|| self.policies.lookup(path))
            .unwrap_or(MergePolicy::Merge);
        if policy == MergePolicy::Replace {
            return strip_markers(overlay);
        }

        match (base, overlay) {
            (Value::Null, Value::Object(map)) => Value::Object(self.merge_maps(path, Map::new(), map)),
            (Value::Null, Value::Array(items)) => {
                Value::Array(self.merge_sequences(path, policy, Vec::new(), items))
            }
            (Value::Object(base_map), Value::Object(overlay_map)) => {
                Value::Object(self.merge_maps(path, base_map, overlay_map))
            }
            (Value::Array(base_items), Value::Array(overlay_items)) => {
                Value::Array(self.merge_sequences(path, policy, base_items, overlay_items))
            }
            (_, overlay) => strip_markers(overlay),
        }
    }

    fn merge_maps(
        &self,
        path: &mut Vec<String>,
        mut base: Map<String, Value>,
        overlay: Map<String, Value>,
    ) -> Map<String, Value> {
        for (raw_key, value) in overlay {
            let (key, marker) = split_marker(&raw_key);
            let key = key.to_string();
            let forced = marker.map(Marker::policy);

            path.push(key.clone());
            match base.get_mut(&key) {
                Some(slot) => {
                    let existing = mem::take(slot);
                    *slot = self.merge_at(path, existing, value, forced);
                }
                None => {
                    let merged = self.merge_at(path, Value::Null, value, forced);
                    base.insert(key, merged);
                }
            }
            path.pop();
        }
        base
    }

    fn merge_sequences(
        &self,
        path: &mut Vec<String>,
        policy: MergePolicy,
        mut base: Vec<Value>,
        overlay: Vec<Value>,
    ) -> Vec<Value> {
        match policy {
            MergePolicy::Append => {
                base.extend(overlay.into_iter().map(strip_markers));
            }
            MergePolicy::Merge | MergePolicy::Replace => {
                for item in overlay {
                    self.union_insert(path, &mut base, strip_markers(item));
                }
            }
        }
        base
    }

    fn union_insert(&self, path: &mut Vec<String>, items: &mut Vec<Value>, item: Value) {
        match items.iter().position(|existing| same_identity(existing, &item)) {
            Some(index) => {
                let existing = mem::take(&mut items[index]);
                items[index] = self.merge_duplicate(path, existing, item);
            }
            None => items.push(item),
        }
    }

    /// Fold a later duplicate into the first occurrence of a set item.
    fn merge_duplicate(&self, path: &mut Vec<String>, existing: Value, later: Value) -> Value {
        if item_name(&existing).is_none() {
            // Structurally equal: nothing to add.
            return existing;
        }

        match (existing, later) {
            (Value::Object(mut first), Value::Object(second)) => {
                for (name, inner) in second {
                    path.push(name.clone());
                    if let Some(slot) = first.get_mut(&name) {
                        let current = mem::take(slot);
                        *slot = self.merge_at(path, current, inner, None);
                    }
                    path.pop();
                }
                Value::Object(first)
            }
            // A bare name is upgraded to the mapping form that carries attributes.
            (Value::String(_), later @ Value::Object(_)) => later,
            (existing, _) => existing,
        }
    }
}

/// Name of a named set item.
///
/// Named items are bare strings (`greet`) or single-key mappings whose value
/// is a mapping or null (`{color: {roles: [...]}}`). Anything else, such as
/// `{intent: greet}` story steps, is identified structurally.
pub fn item_name(item: &Value) -> Option<&str> {
    match item {
        Value::String(name) => Some(name.as_str()),
        Value::Object(map) if map.len() == 1 => {
            let (name, value) = map.iter().next()?;
            match value {
                Value::Object(_) | Value::Null => Some(name.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn same_identity(a: &Value, b: &Value) -> bool {
    match (item_name(a), item_name(b)) {
        (Some(x), Some(y)) => x == y,
        (None, None) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn domain_merger() -> Merger {
        Merger::new(
            PolicyTable::new()
                .with_rule("intents", MergePolicy::Merge)
                .with_rule("responses.*", MergePolicy::Replace)
                .with_rule("stories", MergePolicy::Append),
        )
    }

    fn keys(value: &Value) -> Vec<&str> {
        value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_scalar_override() {
        let base = json!({"timeout": 100});
        let overlay = json!({"timeout": 200});
        let result = Merger::default().merge_pair(base, overlay);
        assert_eq!(result["timeout"], 200);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({
            "session_config": {
                "session_expiration_time": 60,
                "carry_over_slots_to_new_session": true
            }
        });
        let overlay = json!({
            "session_config": {
                "session_expiration_time": 30
            }
        });
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["session_config"]["session_expiration_time"], 30);
        assert_eq!(result["session_config"]["carry_over_slots_to_new_session"], true);
    }

    #[test]
    fn test_sequence_union_preserves_first_seen_order() {
        let base = json!({"intents": ["greet", "affirm"]});
        let overlay = json!({"intents": ["goodbye", "greet"]});
        let result = domain_merger().merge_pair(base, overlay);

        assert_eq!(result["intents"], json!(["greet", "affirm", "goodbye"]));
    }

    #[test]
    fn test_sequence_replace_by_policy() {
        let base = json!({"responses": {"utter_greet": [{"text": "Hello!"}]}});
        let overlay = json!({
            "responses": {"utter_greet": [{"text": "Hi there!"}, {"text": "Welcome!"}]}
        });
        let result = domain_merger().merge_pair(base, overlay);

        assert_eq!(
            result["responses"]["utter_greet"],
            json!([{"text": "Hi there!"}, {"text": "Welcome!"}])
        );
    }

    #[test]
    fn test_sequence_append_keeps_duplicates() {
        let base = json!({"stories": [{"story": "happy path", "steps": []}]});
        let overlay = json!({"stories": [{"story": "happy path", "steps": []}]});
        let result = domain_merger().merge_pair(base, overlay);

        assert_eq!(result["stories"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_add_new_key() {
        let base = json!({"a": 1});
        let overlay = json!({"b": 2});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["a"], 1);
        assert_eq!(result["b"], 2);
    }

    #[test]
    fn test_null_keeps_earlier_value() {
        let base = json!({"actions": ["action_hello"]});
        let overlay = json!({"actions": null});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["actions"], json!(["action_hello"]));
    }

    #[test]
    fn test_absent_key_preserved() {
        let base = json!({"forms": {"order_form": {"required_slots": ["size"]}}, "intents": ["greet"]});
        let overlay = json!({"intents": ["goodbye"]});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["forms"], json!({"order_form": {"required_slots": ["size"]}}));
    }

    #[test]
    fn test_named_items_dedup_and_upgrade() {
        let base = json!({"entities": ["color", "size"]});
        let overlay = json!({"entities": [{"color": {"roles": ["primary"]}}]});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(
            result["entities"],
            json!([{"color": {"roles": ["primary"]}}, "size"])
        );
    }

    #[test]
    fn test_named_items_merge_attributes() {
        let base = json!({"entities": [{"city": {"roles": ["from"]}}]});
        let overlay = json!({"entities": [{"city": {"roles": ["to", "from"]}}, "city"]});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["entities"], json!([{"city": {"roles": ["from", "to"]}}]));
    }

    #[test]
    fn test_step_mappings_identified_structurally() {
        let base = json!({"steps": [{"intent": "greet"}, {"action": "utter_greet"}]});
        let overlay = json!({"steps": [{"intent": "goodbye"}, {"intent": "greet"}]});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(
            result["steps"],
            json!([{"intent": "greet"}, {"action": "utter_greet"}, {"intent": "goodbye"}])
        );
    }

    #[test]
    fn test_replace_marker() {
        let base = json!({"intents": ["greet", "affirm"]});
        let overlay = json!({"intents.replace": ["goodbye"]});
        let result = domain_merger().merge_pair(base, overlay);

        assert_eq!(result["intents"], json!(["goodbye"]));
        assert!(result.get("intents.replace").is_none());
    }

    #[test]
    fn test_add_marker_overrides_replace_policy() {
        let base = json!({"responses": {"utter_greet": [{"text": "Hello!"}]}});
        let overlay = json!({"responses": {"utter_greet.add": [{"text": "Hey!"}]}});
        let result = domain_merger().merge_pair(base, overlay);

        assert_eq!(
            result["responses"]["utter_greet"],
            json!([{"text": "Hello!"}, {"text": "Hey!"}])
        );
    }

    #[test]
    fn test_merge_layers() {
        let base = json!({
            "timeout": 100,
            "cache": {"mode": "off"}
        });
        let region = json!({
            "timeout": 200
        });
        let locale = json!({
            "cache": {"mode": "on"}
        });
        let site = json!({
            "timeout": 50
        });

        let result = Merger::default().merge(vec![base, region, locale, site]);

        assert_eq!(result["timeout"], 50);
        assert_eq!(result["cache"]["mode"], "on");
    }

    #[test]
    fn test_nested_deep_merge() {
        let base = json!({
            "level1": {
                "level2": {
                    "a": 1,
                    "b": 2
                }
            }
        });
        let overlay = json!({
            "level1": {
                "level2": {
                    "b": 3,
                    "c": 4
                }
            }
        });
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(result["level1"]["level2"]["a"], 1);
        assert_eq!(result["level1"]["level2"]["b"], 3);
        assert_eq!(result["level1"]["level2"]["c"], 4);
    }

    #[test]
    fn test_key_order_follows_declaration() {
        let base = json!({"version": "3.1", "intents": ["greet"], "responses": {}});
        let overlay = json!({"slots": {}, "intents": ["bye"], "actions": []});
        let result = Merger::default().merge_pair(base, overlay);

        assert_eq!(
            keys(&result),
            vec!["version", "intents", "responses", "slots", "actions"]
        );
    }

    #[test]
    fn test_scalar_order_sensitive_sets_order_insensitive() {
        let l1 = json!({"intents": ["greet"], "slots": {"entity_color": {"type": "int"}}});
        let l2 = json!({"intents": ["goodbye"], "slots": {"entity_color": {"type": "string"}}});
        let merger = domain_merger();

        let forward = merger.merge(vec![l1.clone(), l2.clone()]);
        let backward = merger.merge(vec![l2, l1]);

        assert_eq!(forward["slots"]["entity_color"]["type"], "string");
        assert_eq!(backward["slots"]["entity_color"]["type"], "int");

        let as_set = |v: &Value| {
            let mut names: Vec<String> = v["intents"]
                .as_array()
                .unwrap()
                .iter()
                .map(|i| i.as_str().unwrap().to_string())
                .collect();
            names.sort();
            names
        };
        assert_eq!(as_set(&forward), vec!["goodbye", "greet"]);
        assert_eq!(as_set(&forward), as_set(&backward));
    }

    #[test]
    fn test_self_merge_idempotent_for_sets() {
        let layer = json!({
            "intents": ["greet", "greet", "bye"],
            "entities": ["color"],
            "actions": ["action_a"]
        });
        let merger = domain_merger();

        let once = merger.merge(vec![layer.clone()]);
        let twice = merger.merge(vec![layer.clone(), layer]);

        assert_eq!(once, twice);
        assert_eq!(once["intents"], json!(["greet", "bye"]));
    }

    #[test]
    fn test_deterministic_serialization() {
        let docs = vec![
            json!({"b": [1, 2], "a": {"y": 1, "x": 2}}),
            json!({"c": true, "a": {"z": 3}}),
        ];
        let merger = Merger::default();

        let first = serde_json::to_string(&merger.merge(docs.clone())).unwrap();
        let second = serde_json::to_string(&merger.merge(docs)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, r#"{"b":[1,2],"a":{"y":1,"x":2,"z":3},"c":true}"#);
    }

    #[test]
    fn test_item_name() {
        assert_eq!(item_name(&json!("greet")), Some("greet"));
        assert_eq!(item_name(&json!({"color": {"roles": []}})), Some("color"));
        assert_eq!(item_name(&json!({"color": null})), Some("color"));
        assert_eq!(item_name(&json!({"intent": "greet"})), None);
        assert_eq!(item_name(&json!({"a": {}, "b": {}})), None);
        assert_eq!(item_name(&json!(3)), None);
    }
}
