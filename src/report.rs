//! Project info summary
//!
//! A dry-run view of the layer stack: which layers resolved, what each one
//! contributes, which single-file configs were selected and, after a full
//! merge, canonical digests of the merged domain and NLU data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::layer::{LayerRole, ResolvedLayers, SkippedLayer};
use crate::loader::{DocumentKind, LayerDocuments};
use crate::select::{SelectedFile, Selection};

/// Schema version for the info file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "layerstack/project_info@1";

/// One resolved layer and what it contributes.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectEntry {
    pub index: usize,
    pub root: PathBuf,
    pub role: LayerRole,
    pub kinds: Vec<DocumentKind>,
}

/// A selected single-file document.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedEntry {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<usize>,

    pub digest: String,

    /// Redacted key paths (credentials only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<String>,
}

impl SelectedEntry {
    fn from_selected(file: &SelectedFile, redact: bool) -> Self {
        let redactions = if redact { file.redacted().1 } else { Vec::new() };
        Self {
            path: file.path.clone(),
            layer: file.layer,
            digest: file.digest.clone(),
            redactions,
        }
    }
}

/// Summary of a layer stack and its merge.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<PathBuf>,
    pub overlay_domain: Vec<PathBuf>,
    pub overlay_nlu: Vec<PathBuf>,
    pub overlay_stories: Vec<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<SelectedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<SelectedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SelectedEntry>,

    pub projects: Vec<ProjectEntry>,
    pub skipped: Vec<SkippedLayer>,

    /// SHA-256 of the JCS form of the merged domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_digest: Option<String>,

    /// SHA-256 of the JCS form of the merged NLU data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlu_digest: Option<String>,
}

impl ProjectInfo {
    /// Summarize resolved layers, their documents and the selection.
    pub fn new(
        resolved: &ResolvedLayers,
        documents: &[LayerDocuments],
        selection: Option<&Selection>,
    ) -> Self {
        let roots = |role| {
            resolved
                .roots_with_role(role)
                .into_iter()
                .map(Path::to_path_buf)
                .collect::<Vec<_>>()
        };

        let projects = resolved
            .layers
            .iter()
            .map(|layer| ProjectEntry {
                index: layer.index,
                root: layer.root.clone(),
                role: layer.role,
                kinds: documents
                    .iter()
                    .find(|docs| docs.layer.index == layer.index)
                    .map(|docs| docs.kinds().collect())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            base_domain: roots(LayerRole::Base).into_iter().next(),
            overlay_domain: roots(LayerRole::Overlay),
            overlay_nlu: roots(LayerRole::NluOverlay),
            overlay_stories: roots(LayerRole::StoriesOverlay),
            config: selection.map(|s| SelectedEntry::from_selected(&s.config, false)),
            endpoints: selection
                .and_then(|s| s.endpoints.as_ref())
                .map(|f| SelectedEntry::from_selected(f, false)),
            credentials: selection
                .and_then(|s| s.credentials.as_ref())
                .map(|f| SelectedEntry::from_selected(f, true)),
            projects,
            skipped: resolved.skipped.clone(),
            domain_digest: None,
            nlu_digest: None,
        }
    }

    /// Record digests of the merged documents.
    pub fn with_digests(mut self, domain: &Value, nlu: &Value) -> Result<Self, serde_json::Error> {
        self.domain_digest = Some(jcs_digest(domain)?);
        self.nlu_digest = Some(jcs_digest(nlu)?);
        Ok(self)
    }

    /// Serialize to JSON (pretty printed)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Format as human-readable text
    pub fn to_human(&self) -> String {
        let mut output = String::from("--- Layers ---\n");

        for project in &self.projects {
            let kinds: Vec<_> = project.kinds.iter().map(DocumentKind::as_str).collect();
            output.push_str(&format!(
                "[{}] {} ({}): {}\n",
                project.index,
                project.root.display(),
                project.role.as_str(),
                if kinds.is_empty() {
                    "nothing".to_string()
                } else {
                    kinds.join(", ")
                }
            ));
        }
        for skipped in &self.skipped {
            output.push_str(&format!(
                "skipped {} ({}): {}\n",
                skipped.path.display(),
                skipped.role.as_str(),
                skipped.reason
            ));
        }

        output.push_str("\n--- Selected Files ---\n");
        let selected = [
            ("config", &self.config),
            ("endpoints", &self.endpoints),
            ("credentials", &self.credentials),
        ];
        for (label, entry) in selected {
            match entry {
                Some(entry) => {
                    let origin = entry
                        .layer
                        .map(|l| format!("layer {}", l))
                        .unwrap_or_else(|| "fallback".to_string());
                    output.push_str(&format!("{}: {} ({})\n", label, entry.path.display(), origin));
                    if !entry.redactions.is_empty() {
                        output.push_str(&format!("  redacted: {}\n", entry.redactions.join(", ")));
                    }
                }
                None => output.push_str(&format!("{}: none\n", label)),
            }
        }

        if self.domain_digest.is_some() || self.nlu_digest.is_some() {
            output.push_str("\n--- Digests ---\n");
            if let Some(ref digest) = self.domain_digest {
                output.push_str(&format!("domain: {}\n", digest));
            }
            if let Some(ref digest) = self.nlu_digest {
                output.push_str(&format!("nlu: {}\n", digest));
            }
        }

        output
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
    }
}

/// SHA-256 hex digest of the RFC 8785 canonical form of a value.
pub fn jcs_digest(value: &Value) -> Result<String, serde_json::Error> {
    let jcs_bytes = serde_json_canonicalizer::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&jcs_bytes);
    Ok(hex::encode(hasher.finalize()))
}
