//! Synonym tables

use std::collections::HashMap;

use layerstack_merge::Marker;
use serde_json::Value;
use tracing::debug;

use super::ConflictError;
use crate::nlu::{nlu_items, normalize_example, parse_item, render_examples, ItemKind};

#[derive(Debug, Clone, PartialEq)]
struct Mapping {
    canonical: String,
    layer: usize,
}

/// Surface form to canonical value table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynonymTable {
    surfaces: HashMap<String, Mapping>,
    canonicals: Vec<String>,
}

impl SynonymTable {
    /// Canonical value a surface form resolves to.
    pub fn canonical(&self, surface: &str) -> Option<&str> {
        self.surfaces
            .get(&normalize_example(surface))
            .map(|mapping| mapping.canonical.as_str())
    }

    /// Canonical values in first-declared order.
    pub fn canonicals(&self) -> &[String] {
        &self.canonicals
    }

    /// Number of distinct surface forms.
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    fn forget(&mut self, canonical: &str) {
        self.surfaces.retain(|_, mapping| mapping.canonical != canonical);
    }

    fn register(&mut self, layer: usize, canonical: &str, surface: &str) -> Result<(), ConflictError> {
        let surface = normalize_example(surface);
        if surface.is_empty() {
            return Ok(());
        }

        if !self.canonicals.iter().any(|c| c == canonical) {
            self.canonicals.push(canonical.to_string());
        }

        match self.surfaces.get(&surface) {
            Some(existing) if existing.canonical != canonical => Err(ConflictError::AmbiguousSynonym {
                surface,
                first_canonical: existing.canonical.clone(),
                first_layer: existing.layer,
                second_canonical: canonical.to_string(),
                second_layer: layer,
            }),
            Some(_) => Ok(()),
            None => {
                self.surfaces.insert(
                    surface,
                    Mapping {
                        canonical: canonical.to_string(),
                        layer,
                    },
                );
                Ok(())
            }
        }
    }
}

/// Check per-layer synonym items for ambiguous surface forms and prune the
/// merged synonym items to the surface forms the table maps to them.
///
/// `per_layer` yields `(layer index, NLU document)` in precedence order.
pub fn consolidate_synonyms<'a, I>(per_layer: I, merged_nlu: &mut Value) -> Result<SynonymTable, ConflictError>
where
    I: IntoIterator<Item = (usize, &'a Value)>,
{
    let mut table = SynonymTable::default();

    for (layer, doc) in per_layer {
        for raw in nlu_items(doc) {
            let Some(item) = parse_item(raw).filter(|item| item.kind == ItemKind::Synonym) else {
                continue;
            };
            if item.marker == Some(Marker::Replace) {
                debug!(layer, canonical = %item.name, "synonym replaced");
                table.forget(&item.name);
            }
            for surface in &item.examples {
                table.register(layer, &item.name, surface)?;
            }
        }
    }

    if let Some(Value::Array(items)) = merged_nlu.get_mut("nlu") {
        for raw in items.iter_mut() {
            let Some(item) = parse_item(raw).filter(|item| item.kind == ItemKind::Synonym) else {
                continue;
            };
            let kept: Vec<String> = item
                .examples
                .iter()
                .filter(|surface| table.canonical(surface) == Some(item.name.as_str()))
                .cloned()
                .collect();
            if kept.len() != item.examples.len() {
                debug!(canonical = %item.name, dropped = item.examples.len() - kept.len(), "pruned stale surface forms");
                if let Value::Object(map) = raw {
                    map.insert("examples".to_string(), Value::String(render_examples(&kept)));
                }
            }
        }
    }

    debug!(surfaces = table.len(), "synonyms consolidated");
    Ok(table)
}
