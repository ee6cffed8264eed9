//! Single-file configuration selection
//!
//! Pipeline config, endpoints and credentials are never merged. For each
//! kind the highest-precedence layer that provides the file wins and every
//! lower layer's file is ignored entirely.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::loader::{read_standalone, DocumentKind, LayerDocuments, LoadError};

/// Keys that contain secrets and are redacted in summaries
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// Placeholder written over redacted values
pub const REDACTED: &str = "[REDACTED]";

/// A selected whole file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedFile {
    pub kind: DocumentKind,

    /// Contributing layer (None for the fallback config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<usize>,

    pub path: PathBuf,

    /// Raw file text, exported verbatim
    #[serde(skip)]
    pub raw: String,

    #[serde(skip)]
    pub value: Value,

    /// SHA-256 of the raw file bytes
    pub digest: String,
}

impl SelectedFile {
    /// Parsed content with secret-like values redacted, plus the redacted key paths.
    pub fn redacted(&self) -> (Value, Vec<String>) {
        let mut value = self.value.clone();
        let redactions = redact_secrets(&mut value);
        (value, redactions)
    }
}

/// The selected single-file documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub config: SelectedFile,
    pub endpoints: Option<SelectedFile>,
    pub credentials: Option<SelectedFile>,
}

impl Selection {
    pub fn get(&self, kind: DocumentKind) -> Option<&SelectedFile> {
        match kind {
            DocumentKind::Config => Some(&self.config),
            DocumentKind::Endpoints => self.endpoints.as_ref(),
            DocumentKind::Credentials => self.credentials.as_ref(),
            _ => None,
        }
    }
}

/// Selection errors
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("no layer provides a pipeline config and the fallback {fallback:?} does not exist")]
    NoPipelineConfig { fallback: Option<PathBuf> },

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Pick the file for a kind from the highest-precedence layer that has one.
pub fn select_file(documents: &[LayerDocuments], kind: DocumentKind) -> Option<SelectedFile> {
    documents.iter().rev().find_map(|layer| {
        let doc = layer.get(kind)?;
        let part = doc.parts.first()?;
        Some(SelectedFile {
            kind,
            layer: Some(doc.layer),
            path: part.path.clone(),
            raw: part.raw.clone(),
            value: part.value.clone(),
            digest: part.digest.clone(),
        })
    })
}

/// Select pipeline config, endpoints and credentials.
///
/// A missing pipeline config falls back to `default_config`; if that does
/// not exist either, selection fails.
pub fn select_all(
    documents: &[LayerDocuments],
    default_config: Option<&Path>,
) -> Result<Selection, SelectError> {
    let config = match select_file(documents, DocumentKind::Config) {
        Some(selected) => selected,
        None => fallback_config(default_config)?,
    };
    info!(path = %config.path.display(), layer = ?config.layer, "selected pipeline config");

    let endpoints = select_file(documents, DocumentKind::Endpoints);
    let credentials = select_file(documents, DocumentKind::Credentials);
    for (kind, selected) in [
        (DocumentKind::Endpoints, &endpoints),
        (DocumentKind::Credentials, &credentials),
    ] {
        match selected {
            Some(file) => debug!(kind = kind.as_str(), path = %file.path.display(), "selected"),
            None => debug!(kind = kind.as_str(), "no layer provides this file"),
        }
    }

    Ok(Selection {
        config,
        endpoints,
        credentials,
    })
}

fn fallback_config(default_config: Option<&Path>) -> Result<SelectedFile, SelectError> {
    let missing = || SelectError::NoPipelineConfig {
        fallback: default_config.map(Path::to_path_buf),
    };

    let path = default_config.filter(|p| p.is_file()).ok_or_else(missing)?;
    let part = read_standalone(path)?.ok_or_else(missing)?;
    debug!(path = %path.display(), "using fallback pipeline config");

    Ok(SelectedFile {
        kind: DocumentKind::Config,
        layer: None,
        path: part.path,
        raw: part.raw,
        value: part.value,
        digest: part.digest,
    })
}

/// Redact secrets in place, returning the redacted key paths.
pub fn redact_secrets(value: &mut Value) -> Vec<String> {
    let mut redactions = Vec::new();
    redact_recursive(value, String::new(), &mut redactions);
    redactions
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));
                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String(REDACTED.to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(items) => {
            for (i, val) in items.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, LayerRole};
    use crate::loader::load_layers;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn layers(dir: &TempDir, names: &[&str]) -> Vec<Layer> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let root = dir.path().join(name);
                fs::create_dir_all(&root).unwrap();
                Layer {
                    index,
                    root,
                    role: if index == 0 { LayerRole::Base } else { LayerRole::Overlay },
                }
            })
            .collect()
    }

    #[test]
    fn test_highest_layer_wins() {
        let dir = TempDir::new().unwrap();
        let stack = layers(&dir, &["core", "en", "en-us"]);
        fs::write(stack[0].root.join("config.yml"), "language: xx\n").unwrap();
        fs::write(stack[1].root.join("config.yml"), "language: en\n").unwrap();

        let docs = load_layers(&stack).unwrap();
        let selection = select_all(&docs, None).unwrap();

        assert_eq!(selection.config.layer, Some(1));
        assert_eq!(selection.config.value, json!({"language": "en"}));
        assert_eq!(selection.config.raw, "language: en\n");
        assert!(selection.endpoints.is_none());
        assert!(selection.credentials.is_none());
    }

    #[test]
    fn test_fallback_config() {
        let dir = TempDir::new().unwrap();
        let stack = layers(&dir, &["core"]);
        let fallback = dir.path().join("default-config.yml");
        fs::write(&fallback, "pipeline: []\n").unwrap();

        let docs = load_layers(&stack).unwrap();
        let selection = select_all(&docs, Some(&fallback)).unwrap();

        assert_eq!(selection.config.layer, None);
        assert_eq!(selection.config.path, fallback);
    }

    #[test]
    fn test_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let stack = layers(&dir, &["core"]);
        let docs = load_layers(&stack).unwrap();

        let err = select_all(&docs, Some(&dir.path().join("nope.yml"))).unwrap_err();
        assert!(matches!(err, SelectError::NoPipelineConfig { fallback: Some(_) }));

        let err = select_all(&docs, None).unwrap_err();
        assert!(matches!(err, SelectError::NoPipelineConfig { fallback: None }));
    }

    #[test]
    fn test_lower_layer_credentials_used_when_higher_has_none() {
        let dir = TempDir::new().unwrap();
        let stack = layers(&dir, &["core", "en"]);
        fs::write(stack[0].root.join("config.yml"), "language: xx\n").unwrap();
        fs::write(stack[0].root.join("credentials.yml"), "rest: {}\n").unwrap();
        fs::write(stack[1].root.join("endpoints.yaml"), "action_endpoint: {url: x}\n").unwrap();

        let docs = load_layers(&stack).unwrap();
        let selection = select_all(&docs, None).unwrap();

        assert_eq!(selection.credentials.as_ref().unwrap().layer, Some(0));
        assert_eq!(selection.endpoints.as_ref().unwrap().layer, Some(1));
        assert_eq!(
            selection.get(DocumentKind::Endpoints).map(|f| f.kind),
            Some(DocumentKind::Endpoints)
        );
    }

    #[test]
    fn test_secret_redaction() {
        let mut value = json!({
            "slack": {"slack_token": "xoxb-1", "slack_channel": "general"},
            "rasa": {"url": "http://x"},
            "users": [{"password": "hunter2"}]
        });

        let redactions = redact_secrets(&mut value);

        assert_eq!(value["slack"]["slack_token"], REDACTED);
        assert_eq!(value["slack"]["slack_channel"], "general");
        assert_eq!(value["users"][0]["password"], REDACTED);
        assert_eq!(redactions, vec!["slack.slack_token", "users[0].password"]);
    }
}
