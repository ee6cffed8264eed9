//! Story and rule merge
//!
//! Flows are additive: every layer's stories (or rules) are appended after
//! the earlier layers' in precedence order. Flows are never merged by name,
//! so two layers defining a story with the same name both keep theirs.

use layerstack_merge::{MergePolicy, Merger, PolicyTable};
use serde_json::{Map, Value};

use crate::loader::{DocumentKind, LayerDocument};
use crate::nlu::DEFAULT_NLU_VERSION;

/// Story and rule policies.
pub fn default_story_policies() -> PolicyTable {
    PolicyTable::new()
        .with_rule("stories", MergePolicy::Append)
        .with_rule("rules", MergePolicy::Append)
}

/// Concatenate story or rule documents in precedence order.
///
/// The result always carries a `version` and the section list for the kind,
/// even when no layer contributed one.
pub fn merge_stories<'a, I>(kind: DocumentKind, documents: I) -> Value
where
    I: IntoIterator<Item = &'a LayerDocument>,
{
    let merger = Merger::new(default_story_policies());
    let merged = merger.merge(documents.into_iter().flat_map(|doc| doc.values().cloned()));

    let mut out = match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let section = section_key(kind);
    if !out.contains_key(section) {
        out.insert(section.to_string(), Value::Array(Vec::new()));
    }

    // `version` leads the document like the other exported kinds.
    let version = out
        .remove("version")
        .unwrap_or_else(|| Value::String(DEFAULT_NLU_VERSION.to_string()));
    let mut ordered = Map::new();
    ordered.insert("version".to_string(), version);
    ordered.extend(out);
    Value::Object(ordered)
}

fn section_key(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Rules => "rules",
        _ => "stories",
    }
}

/// Number of flows in a merged story or rule document.
pub fn flow_count(doc: &Value, kind: DocumentKind) -> usize {
    doc.get(section_key(kind))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DocumentPart;
    use serde_json::json;
    use std::path::PathBuf;

    fn doc(layer: usize, kind: DocumentKind, value: Value) -> LayerDocument {
        let path = PathBuf::from(format!("layer{}/{}.yml", layer, kind));
        LayerDocument {
            layer,
            kind,
            source: path.clone(),
            parts: vec![DocumentPart {
                path,
                value,
                raw: String::new(),
                digest: String::new(),
            }],
        }
    }

    #[test]
    fn test_stories_concatenate_with_collisions() {
        let story = json!({"stories": [{"story": "greet", "steps": [{"intent": "greet"}]}]});
        let base = doc(0, DocumentKind::Stories, story.clone());
        let overlay = doc(1, DocumentKind::Stories, story);

        let merged = merge_stories(DocumentKind::Stories, [&base, &overlay]);

        assert_eq!(flow_count(&merged, DocumentKind::Stories), 2);
    }

    #[test]
    fn test_layer_order_is_kept() {
        let base = doc(0, DocumentKind::Rules, json!({"rules": [{"rule": "a"}]}));
        let overlay = doc(1, DocumentKind::Rules, json!({"rules": [{"rule": "b"}]}));

        let merged = merge_stories(DocumentKind::Rules, [&base, &overlay]);

        assert_eq!(merged["rules"], json!([{"rule": "a"}, {"rule": "b"}]));
    }

    #[test]
    fn test_version_leads_and_last_declaration_wins() {
        let base = doc(0, DocumentKind::Stories, json!({"stories": [], "version": "2.0"}));
        let overlay = doc(1, DocumentKind::Stories, json!({"version": "3.1"}));

        let merged = merge_stories(DocumentKind::Stories, [&base, &overlay]);

        let keys: Vec<_> = merged.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["version", "stories"]);
        assert_eq!(merged["version"], json!("3.1"));
    }

    #[test]
    fn test_no_documents_yields_empty_section() {
        let merged = merge_stories(DocumentKind::Rules, Vec::<&LayerDocument>::new());
        assert_eq!(merged, json!({"version": "3.1", "rules": []}));
    }
}
