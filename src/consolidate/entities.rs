//! Entity declarations

use std::collections::HashSet;

use layerstack_merge::{item_name, split_marker, Marker, MergePolicy, PolicyTable};
use serde_json::{Map, Value};
use tracing::debug;

use super::ConflictError;

/// One consolidated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub name: String,

    /// Layer that first declared the entity
    pub layer: usize,

    /// Extraction type and the layer that set it
    pub entity_type: Option<(String, usize)>,

    pub roles: Vec<String>,
    pub groups: Vec<String>,

    /// Remaining attributes, deep-merged by the engine
    pub attributes: Map<String, Value>,
}

impl EntityRecord {
    fn new(name: &str, layer: usize) -> Self {
        Self {
            name: name.to_string(),
            layer,
            entity_type: None,
            roles: Vec::new(),
            groups: Vec::new(),
            attributes: Map::new(),
        }
    }

    /// Canonical domain form: a bare name, or `{name: {...}}` when it has attributes.
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        if let Some((entity_type, _)) = &self.entity_type {
            body.insert("type".to_string(), Value::String(entity_type.clone()));
        }
        if !self.roles.is_empty() {
            body.insert("roles".to_string(), strings(&self.roles));
        }
        if !self.groups.is_empty() {
            body.insert("groups".to_string(), strings(&self.groups));
        }
        for (key, value) in &self.attributes {
            body.insert(key.clone(), value.clone());
        }

        if body.is_empty() {
            Value::String(self.name.clone())
        } else {
            let mut out = Map::new();
            out.insert(self.name.clone(), Value::Object(body));
            Value::Object(out)
        }
    }
}

fn strings(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn union_into(target: &mut Vec<String>, value: Option<&Value>) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items.iter().filter_map(Value::as_str) {
        if !target.iter().any(|existing| existing == item) {
            target.push(item.to_string());
        }
    }
}

/// Consolidated entities in first-declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRegistry {
    entities: Vec<EntityRecord>,
}

impl EntityRegistry {
    pub fn get(&self, name: &str) -> Option<&EntityRecord> {
        self.entities.iter().find(|record| record.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn declare(&mut self, layer: usize, raw: &Value) -> Result<(), ConflictError> {
        let Some(name) = item_name(raw) else {
            debug!(layer, entity = %raw, "ignoring entity declaration of unknown shape");
            return Ok(());
        };

        let position = match self.entities.iter().position(|r| r.name == name) {
            Some(position) => position,
            None => {
                self.entities.push(EntityRecord::new(name, layer));
                self.entities.len() - 1
            }
        };
        let record = &mut self.entities[position];

        let Some(body) = raw.get(name).and_then(Value::as_object) else {
            return Ok(());
        };

        if let Some(declared) = body.get("type").and_then(Value::as_str).filter(|t| !t.is_empty()) {
            match &record.entity_type {
                Some((existing, first_layer)) if existing != declared => {
                    return Err(ConflictError::EntityType {
                        entity: name.to_string(),
                        first_layer: *first_layer,
                        first_type: existing.clone(),
                        second_layer: layer,
                        second_type: declared.to_string(),
                    });
                }
                Some(_) => {}
                None => record.entity_type = Some((declared.to_string(), layer)),
            }
        }

        union_into(&mut record.roles, body.get("roles"));
        union_into(&mut record.groups, body.get("groups"));
        Ok(())
    }
}

/// Raw `entities` list of a domain document and whether it carries a replace marker.
fn entity_section(doc: &Value) -> Option<(&[Value], Option<Marker>)> {
    doc.as_object()?.iter().find_map(|(key, value)| {
        let (base, marker) = split_marker(key);
        (base == "entities").then_some((value.as_array()?.as_slice(), marker))
    })
}

/// Check per-layer entity declarations and rewrite the merged `entities`
/// section into its canonical form.
///
/// `per_layer` yields `(layer index, domain document)` in precedence order.
/// A section that replaces the earlier ones, through a `.replace` marker or
/// a `replace` policy for `entities` in `policies`, also resets the
/// declarations seen so far.
pub fn consolidate_entities<'a, I>(
    per_layer: I,
    policies: &PolicyTable,
    merged_domain: &mut Value,
) -> Result<EntityRegistry, ConflictError>
where
    I: IntoIterator<Item = (usize, &'a Value)>,
{
    let section_policy = policies
        .lookup(&["entities".to_string()])
        .unwrap_or(MergePolicy::Merge);
    let mut registry = EntityRegistry::default();

    for (layer, doc) in per_layer {
        let Some((items, marker)) = entity_section(doc) else {
            continue;
        };
        if marker.map(Marker::policy).unwrap_or(section_policy) == MergePolicy::Replace {
            debug!(layer, "entity declarations replaced");
            registry = EntityRegistry::default();
        }
        for raw in items {
            registry.declare(layer, raw)?;
        }
    }

    // Only entities the engine kept survive; attributes other than roles,
    // groups and type come from the engine's merge.
    if let Some(Value::Array(merged)) = merged_domain.get("entities") {
        let kept: HashSet<&str> = merged.iter().filter_map(item_name).collect();
        registry.entities.retain(|record| kept.contains(record.name.as_str()));
        for raw in merged {
            let Some(name) = item_name(raw) else { continue };
            let Some(body) = raw.get(name).and_then(Value::as_object) else {
                continue;
            };
            if let Some(record) = registry.entities.iter_mut().find(|r| r.name == name) {
                record.attributes = body
                    .iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "type" | "roles" | "groups"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
            }
        }
    }

    if let Value::Object(domain) = merged_domain {
        if !registry.is_empty() {
            let canonical = registry.iter().map(EntityRecord::to_value).collect();
            domain.insert("entities".to_string(), Value::Array(canonical));
        }
    }

    debug!(entities = registry.len(), "entities consolidated");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_domain_policies;
    use serde_json::json;

    fn policies() -> PolicyTable {
        default_domain_policies()
    }

    #[test]
    fn test_roles_and_groups_union_in_first_seen_order() {
        let l0 = json!({"entities": [{"city": {"roles": ["from", "to"]}}]});
        let l1 = json!({"entities": ["city", {"city": {"roles": ["to", "via"], "groups": ["trip"]}}]});
        let mut merged = json!({"entities": [{"city": {"roles": ["from", "to", "via"], "groups": ["trip"]}}]});

        let registry = consolidate_entities([(0, &l0), (1, &l1)], &policies(), &mut merged).unwrap();

        let city = registry.get("city").unwrap();
        assert_eq!(city.layer, 0);
        assert_eq!(city.roles, vec!["from", "to", "via"]);
        assert_eq!(city.groups, vec!["trip"]);
        assert_eq!(
            merged["entities"],
            json!([{"city": {"roles": ["from", "to", "via"], "groups": ["trip"]}}])
        );
    }

    #[test]
    fn test_type_conflict_names_both_layers() {
        let l0 = json!({"entities": [{"amount": {"type": "number"}}]});
        let l1 = json!({"entities": [{"amount": {"type": "text"}}]});
        let mut merged = json!({});

        let err = consolidate_entities([(0, &l0), (1, &l1)], &policies(), &mut merged).unwrap_err();

        match err {
            ConflictError::EntityType {
                entity,
                first_layer,
                first_type,
                second_layer,
                second_type,
            } => {
                assert_eq!(entity, "amount");
                assert_eq!((first_layer, second_layer), (0, 1));
                assert_eq!(first_type, "number");
                assert_eq!(second_type, "text");
            }
            other => panic!("unexpected conflict: {:?}", other),
        }
    }

    #[test]
    fn test_same_type_is_not_a_conflict() {
        let l0 = json!({"entities": [{"amount": {"type": "number"}}]});
        let l1 = json!({"entities": [{"amount": {"type": "number"}}, "currency"]});
        let mut merged = json!({"entities": [{"amount": {"type": "number"}}, "currency"]});

        let registry = consolidate_entities([(0, &l0), (1, &l1)], &policies(), &mut merged).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            merged["entities"],
            json!([{"amount": {"type": "number"}}, "currency"])
        );
    }

    #[test]
    fn test_replace_marker_forgets_earlier_declarations() {
        let l0 = json!({"entities": [{"amount": {"type": "number"}}]});
        let l1 = json!({"entities.replace": [{"amount": {"type": "text"}}]});
        let mut merged = json!({"entities": [{"amount": {"type": "text"}}]});

        let registry = consolidate_entities([(0, &l0), (1, &l1)], &policies(), &mut merged).unwrap();

        let amount = registry.get("amount").unwrap();
        assert_eq!(amount.entity_type, Some(("text".to_string(), 1)));
        assert_eq!(amount.layer, 1);
    }

    #[test]
    fn test_extra_attributes_survive() {
        let l0 = json!({"entities": [{"size": {"influence_conversation": false}}]});
        let mut merged = json!({"entities": [{"size": {"influence_conversation": false}}]});

        consolidate_entities([(0, &l0)], &policies(), &mut merged).unwrap();

        assert_eq!(
            merged["entities"],
            json!([{"size": {"influence_conversation": false}}])
        );
    }

    #[test]
    fn test_replace_policy_resets_declarations() {
        let l0 = json!({"entities": [{"amount": {"type": "number"}}, "color"]});
        let l1 = json!({"entities": [{"amount": {"type": "text"}}, "size"]});
        let mut merged = json!({"entities": [{"amount": {"type": "text"}}, "size"]});
        let mut table = policies();
        table.insert("entities", MergePolicy::Replace).unwrap();

        let registry = consolidate_entities([(0, &l0), (1, &l1)], &table, &mut merged).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("color").is_none());
        assert_eq!(merged["entities"], json!([{"amount": {"type": "text"}}, "size"]));
    }

    #[test]
    fn test_only_merged_entities_survive() {
        let l0 = json!({"entities": ["color"]});
        let l1 = json!({"entities": ["size"]});
        let mut merged = json!({"entities": ["size"]});

        let registry = consolidate_entities([(0, &l0), (1, &l1)], &policies(), &mut merged).unwrap();

        assert_eq!(registry.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["size"]);
        assert_eq!(merged["entities"], json!(["size"]));
    }
}
