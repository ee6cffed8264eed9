//! Document loading
//!
//! For every resolved layer and every document kind the layer may
//! contribute, the loader tries the kind's candidate locations in priority
//! order and loads the first one that exists. A directory candidate yields
//! every YAML file beneath it in sorted path order.
//!
//! The loader never merges: each file becomes one [`DocumentPart`] carrying
//! its parsed value, raw text and SHA-256 digest.

mod kind;

pub use kind::DocumentKind;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::layer::Layer;

/// One parsed YAML file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPart {
    pub path: PathBuf,

    /// Parsed content (always a mapping)
    pub value: Value,

    /// Raw file text, kept for verbatim selection
    #[serde(skip)]
    pub raw: String,

    /// SHA-256 of the raw file bytes
    pub digest: String,
}

/// Everything one layer contributes for one document kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDocument {
    pub layer: usize,
    pub kind: DocumentKind,

    /// The candidate location that matched
    pub source: PathBuf,

    /// Files in load order
    pub parts: Vec<DocumentPart>,
}

impl LayerDocument {
    /// Parsed values of every part, in load order.
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.parts.iter().map(|part| &part.value)
    }
}

/// All documents loaded from one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDocuments {
    pub layer: Layer,
    documents: BTreeMap<DocumentKind, LayerDocument>,
}

impl LayerDocuments {
    pub fn get(&self, kind: DocumentKind) -> Option<&LayerDocument> {
        self.documents.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = DocumentKind> + '_ {
        self.documents.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Document loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("layer {layer} ({root}): failed to read {path}: {source}")]
    Io {
        layer: usize,
        root: PathBuf,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("layer {layer} ({root}): failed to walk {path}: {source}")]
    Walk {
        layer: usize,
        root: PathBuf,
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("layer {layer} ({root}): malformed document {path}: {message}")]
    Parse {
        layer: usize,
        root: PathBuf,
        path: PathBuf,
        message: String,
    },
}

impl LoadError {
    fn io(layer: &Layer, path: &Path, source: io::Error) -> Self {
        LoadError::Io {
            layer: layer.index,
            root: layer.root.clone(),
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(layer: &Layer, path: &Path, message: impl Into<String>) -> Self {
        LoadError::Parse {
            layer: layer.index,
            root: layer.root.clone(),
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Load every layer in order, failing on the first malformed document.
pub fn load_layers(layers: &[Layer]) -> Result<Vec<LayerDocuments>, LoadError> {
    layers.iter().map(load_layer).collect()
}

/// Load all documents a single layer contributes.
pub fn load_layer(layer: &Layer) -> Result<LayerDocuments, LoadError> {
    let mut documents = BTreeMap::new();

    for &kind in layer.role.kinds() {
        let Some(source) = locate(&layer.root, kind) else {
            debug!(%layer, kind = kind.as_str(), "no document of this kind");
            continue;
        };

        let files = if source.is_dir() {
            collect_yaml_files(&source).map_err(|e| LoadError::Walk {
                layer: layer.index,
                root: layer.root.clone(),
                path: source.clone(),
                source: e,
            })?
        } else {
            vec![source.clone()]
        };

        let mut parts = Vec::with_capacity(files.len());
        for file in &files {
            if let Some(part) = read_part(layer, file)? {
                parts.push(part);
            }
        }

        if parts.is_empty() {
            debug!(%layer, kind = kind.as_str(), source = %source.display(), "document is empty");
            continue;
        }

        info!(
            %layer,
            kind = kind.as_str(),
            source = %source.display(),
            files = parts.len(),
            "loaded document"
        );
        documents.insert(
            kind,
            LayerDocument {
                layer: layer.index,
                kind,
                source,
                parts,
            },
        );
    }

    Ok(LayerDocuments {
        layer: layer.clone(),
        documents,
    })
}

/// First existing candidate location for a kind under a layer root.
pub fn locate(root: &Path, kind: DocumentKind) -> Option<PathBuf> {
    kind.candidates().iter().find_map(|candidate| {
        let is_dir = candidate.ends_with('/');
        let path = root.join(candidate.trim_end_matches('/'));
        let matches = if is_dir { path.is_dir() } else { path.is_file() };
        matches.then_some(path)
    })
}

/// Whether a path has a YAML extension.
pub fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
        .unwrap_or(false)
}

/// All YAML files under a directory, in lexicographic path order.
///
/// Hidden entries are pruned: a dot-file is skipped and a dot-directory
/// is not descended into.
fn collect_yaml_files(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Read and parse one YAML file; empty documents yield `None`.
fn read_part(layer: &Layer, path: &Path) -> Result<Option<DocumentPart>, LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::io(layer, path, e))?;
    let digest = sha256_hex(&bytes);

    let raw = String::from_utf8(bytes)
        .map_err(|e| LoadError::parse(layer, path, format!("invalid UTF-8: {}", e)))?;

    let value = parse_yaml(&raw).map_err(|message| LoadError::parse(layer, path, message))?;
    match value {
        None => Ok(None),
        Some(value) => Ok(Some(DocumentPart {
            path: path.to_path_buf(),
            value,
            raw,
            digest,
        })),
    }
}

/// Parse YAML text into a mapping value. Empty or comment-only text is `None`.
pub fn parse_yaml(text: &str) -> Result<Option<Value>, String> {
    let has_content = text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---"
    });
    if !has_content {
        return Ok(None);
    }

    let value: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    if value.is_null() {
        return Ok(None);
    }
    if !value.is_object() {
        return Err(format!(
            "expected a mapping at the document root, found {}",
            value_kind(&value)
        ));
    }
    Ok(Some(value))
}

/// Read and parse a single YAML file outside any layer (e.g. a fallback config).
pub fn read_standalone(path: &Path) -> Result<Option<DocumentPart>, LoadError> {
    let pseudo = Layer {
        index: 0,
        root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        role: crate::layer::LayerRole::Base,
    };
    read_part(&pseudo, path)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
