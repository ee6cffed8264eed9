//! NLU training data merge
//!
//! NLU documents are a `version` plus an `nlu` list of items. Each item is
//! keyed by its kind (`intent`, `synonym`, `regex`, `lookup`) and carries an
//! `examples` block of `- ` prefixed lines.
//!
//! Items are merged by `(kind, name)` across layers in precedence order:
//! examples are unioned (exact text after whitespace normalization, first
//! occurrence keeps its position), other attributes are deep-merged. An
//! item key marked `intent.replace` discards the examples earlier layers
//! contributed to that item. An example utterance belongs to exactly one
//! intent: a later layer listing it under a different intent is dropped
//! with a warning.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use layerstack_merge::{split_marker, strip_markers, Marker, Merger};
use regex_lite::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Version written when no layer declares one.
pub const DEFAULT_NLU_VERSION: &str = "3.1";

/// Kind of an NLU training item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    Intent,
    Synonym,
    Regex,
    Lookup,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Intent,
        ItemKind::Synonym,
        ItemKind::Regex,
        ItemKind::Lookup,
    ];

    /// The mapping key that introduces an item of this kind.
    pub fn key(&self) -> &'static str {
        match self {
            ItemKind::Intent => "intent",
            ItemKind::Synonym => "synonym",
            ItemKind::Regex => "regex",
            ItemKind::Lookup => "lookup",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.key() == key)
    }
}

/// One recognized item from a single NLU document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub kind: ItemKind,

    /// Identity of the item; scalar names use their textual form
    pub name: String,

    /// Name as written (`true` stays a boolean)
    pub label: Value,

    pub marker: Option<Marker>,
    pub examples: Vec<String>,
    pub attributes: Map<String, Value>,
}

/// Raw `nlu` items of a document, honoring `nlu.add` / `nlu.replace` spellings.
pub fn nlu_items(doc: &Value) -> &[Value] {
    doc.as_object()
        .and_then(|map| {
            map.iter()
                .find(|(key, _)| split_marker(key).0 == "nlu")
                .and_then(|(_, items)| items.as_array())
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Recognize an NLU item; `None` for items of unknown shape.
pub fn parse_item(raw: &Value) -> Option<ParsedItem> {
    let map = raw.as_object()?;

    let (kind, marker, (name, label)) = map.iter().find_map(|(key, value)| {
        let (base, marker) = split_marker(key);
        let kind = ItemKind::from_key(base)?;
        Some((kind, marker, item_label(value)?))
    })?;

    let examples = match map.get("examples") {
        Some(Value::String(block)) => parse_examples(block),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let attributes = map
        .iter()
        .filter(|(key, _)| {
            key.as_str() != "examples" && ItemKind::from_key(split_marker(key).0).is_none()
        })
        .map(|(key, value)| (key.clone(), strip_markers(value.clone())))
        .collect();

    Some(ParsedItem {
        kind,
        name,
        label,
        marker,
        examples,
        attributes,
    })
}

/// Identity string and original value of an item name.
///
/// YAML writers often leave canonical values such as `true` or `1`
/// unquoted, so booleans and numbers name items too.
fn item_label(value: &Value) -> Option<(String, Value)> {
    let name = match value {
        Value::String(name) => name.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Some((name, value.clone()))
}

fn example_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*-\s*(.*?)\s*$").expect("example line pattern"))
}

/// Split an `examples` block into individual examples.
pub fn parse_examples(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| {
            let text = match example_line().captures(line) {
                Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
                None => line.trim(),
            };
            (!text.is_empty()).then(|| text.to_string())
        })
        .collect()
}

/// Render examples back into a block.
pub fn render_examples(examples: &[String]) -> String {
    examples.iter().map(|e| format!("- {}\n", e)).collect()
}

/// Whitespace-normalized form used for example identity.
pub fn normalize_example(example: &str) -> String {
    example.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
struct NluItem {
    kind: ItemKind,
    name: String,
    label: Value,
    examples: Vec<String>,
    seen: HashSet<String>,
    attributes: Value,
}

impl NluItem {
    fn new(kind: ItemKind, name: String, label: Value) -> Self {
        Self {
            kind,
            name,
            label,
            examples: Vec::new(),
            seen: HashSet::new(),
            attributes: Value::Object(Map::new()),
        }
    }

    fn render(&self) -> Value {
        let mut out = Map::new();
        out.insert(self.kind.key().to_string(), self.label.clone());
        if let Value::Object(attributes) = &self.attributes {
            for (key, value) in attributes {
                out.insert(key.clone(), value.clone());
            }
        }
        if !self.examples.is_empty() {
            out.insert(
                "examples".to_string(),
                Value::String(render_examples(&self.examples)),
            );
        }
        Value::Object(out)
    }
}

#[derive(Debug)]
enum Entry {
    Item(NluItem),
    Opaque(Value),
}

/// Accumulates NLU documents in precedence order.
#[derive(Debug, Default)]
pub struct NluMerger {
    version: Option<Value>,
    entries: Vec<Entry>,
    index: HashMap<(ItemKind, String), usize>,
    example_owner: HashMap<String, String>,
    dropped_examples: usize,
    attributes: Merger,
}

impl NluMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one document from the given layer.
    pub fn feed(&mut self, layer: usize, doc: &Value) {
        if let Some(version) = doc.get("version").filter(|v| !v.is_null()) {
            self.version = Some(version.clone());
        }

        for raw in nlu_items(doc) {
            match parse_item(raw) {
                Some(item) => self.apply(layer, item),
                None => self.apply_opaque(raw),
            }
        }
    }

    fn apply(&mut self, layer: usize, parsed: ParsedItem) {
        let key = (parsed.kind, parsed.name.clone());
        let index = match self.index.get(&key) {
            Some(&index) => index,
            None => {
                self.entries
                    .push(Entry::Item(NluItem::new(parsed.kind, parsed.name.clone(), parsed.label.clone())));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let Entry::Item(item) = &mut self.entries[index] else {
            return;
        };

        if parsed.marker == Some(Marker::Replace) {
            debug!(layer, kind = item.kind.key(), name = %item.name, "replacing item examples");
            if item.kind == ItemKind::Intent {
                for example in &item.examples {
                    let normalized = normalize_example(example);
                    if self.example_owner.get(&normalized) == Some(&item.name) {
                        self.example_owner.remove(&normalized);
                    }
                }
            }
            item.examples.clear();
            item.seen.clear();
            item.attributes = Value::Object(Map::new());
        }

        let attributes = std::mem::take(&mut item.attributes);
        item.attributes = self
            .attributes
            .merge_pair(attributes, Value::Object(parsed.attributes));

        for example in parsed.examples {
            let normalized = normalize_example(&example);
            if normalized.is_empty() || item.seen.contains(&normalized) {
                continue;
            }
            if item.kind == ItemKind::Intent {
                let owner = self
                    .example_owner
                    .get(&normalized)
                    .filter(|owner| **owner != item.name)
                    .cloned();
                if let Some(owner) = owner {
                    warn!(
                        layer,
                        example = %example,
                        owner = %owner,
                        intent = %item.name,
                        "dropping example already assigned to another intent"
                    );
                    self.dropped_examples += 1;
                    continue;
                }
                self.example_owner
                    .insert(normalized.clone(), item.name.clone());
            }
            item.seen.insert(normalized);
            item.examples.push(example);
        }
    }

    fn apply_opaque(&mut self, raw: &Value) {
        let clean = strip_markers(raw.clone());
        let exists = self
            .entries
            .iter()
            .any(|entry| matches!(entry, Entry::Opaque(v) if v == &clean));
        if !exists {
            self.entries.push(Entry::Opaque(clean));
        }
    }

    /// Intent names in first-seen order.
    pub fn intents(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Item(item) if item.kind == ItemKind::Intent => Some(item.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of examples dropped because another intent already owned them.
    pub fn dropped_examples(&self) -> usize {
        self.dropped_examples
    }

    /// Produce the merged document.
    pub fn finish(self) -> Value {
        let version = self
            .version
            .unwrap_or_else(|| Value::String(DEFAULT_NLU_VERSION.to_string()));
        let items: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| match entry {
                Entry::Item(item) => item.render(),
                Entry::Opaque(value) => value.clone(),
            })
            .collect();

        let mut out = Map::new();
        out.insert("version".to_string(), version);
        out.insert("nlu".to_string(), Value::Array(items));
        Value::Object(out)
    }
}

/// Merge NLU documents given as `(layer index, document)` in precedence order.
pub fn merge_nlu<'a, I>(documents: I) -> Value
where
    I: IntoIterator<Item = (usize, &'a Value)>,
{
    let mut merger = NluMerger::new();
    for (layer, doc) in documents {
        merger.feed(layer, doc);
    }
    merger.finish()
}
