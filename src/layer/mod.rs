//! Layer resolution
//!
//! Turns the ordered list of candidate layer paths into the ordered list of
//! layers that actually exist on disk. Index 0 is the base layer; every
//! later index is an overlay with higher precedence.
//!
//! Resolution never reorders and never deduplicates: a path given twice is
//! two layers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::loader::DocumentKind;

/// Role a layer plays in the stack, which bounds what it may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    /// Base domain layer
    Base,
    /// Overlay domain layer
    Overlay,
    /// Overlay that only contributes NLU data
    NluOverlay,
    /// Overlay that only contributes stories and rules
    StoriesOverlay,
}

impl LayerRole {
    /// Document kinds a layer in this role contributes.
    pub fn kinds(&self) -> &'static [DocumentKind] {
        match self {
            LayerRole::Base | LayerRole::Overlay => &DocumentKind::ALL,
            LayerRole::NluOverlay => &[DocumentKind::Nlu],
            LayerRole::StoriesOverlay => &[DocumentKind::Stories, DocumentKind::Rules],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerRole::Base => "base",
            LayerRole::Overlay => "overlay",
            LayerRole::NluOverlay => "nlu_overlay",
            LayerRole::StoriesOverlay => "stories_overlay",
        }
    }
}

/// A candidate layer as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCandidate {
    pub path: PathBuf,
    pub role: LayerRole,
}

impl LayerCandidate {
    pub fn new(path: impl Into<PathBuf>, role: LayerRole) -> Self {
        Self {
            path: path.into(),
            role,
        }
    }
}

/// A resolved layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Precedence position (0 = base)
    pub index: usize,

    /// Layer root directory
    pub root: PathBuf,

    pub role: LayerRole,
}

impl Layer {
    /// Whether this layer may contribute documents of the given kind.
    pub fn contributes(&self, kind: DocumentKind) -> bool {
        self.role.kinds().contains(&kind)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {} ({})", self.index, self.root.display())
    }
}

/// A candidate dropped during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLayer {
    pub path: PathBuf,
    pub role: LayerRole,
    pub reason: String,
}

/// Result of layer resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLayers {
    /// Existing layers in precedence order
    pub layers: Vec<Layer>,

    /// Candidates that were dropped, in input order
    pub skipped: Vec<SkippedLayer>,
}

impl ResolvedLayers {
    /// The base (lowest-precedence) layer.
    pub fn base(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// Roots of layers with the given role, in precedence order.
    pub fn roots_with_role(&self, role: LayerRole) -> Vec<&Path> {
        self.layers
            .iter()
            .filter(|layer| layer.role == role)
            .map(|layer| layer.root.as_path())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Layer resolution errors
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("no layers resolved: none of the {candidates} candidate path(s) is an existing directory")]
    NoLayers { candidates: usize },
}

/// Filter candidates to existing directories, preserving order.
pub fn resolve_layers(candidates: &[LayerCandidate]) -> Result<ResolvedLayers, LayerError> {
    let mut resolved = ResolvedLayers::default();

    for candidate in candidates {
        let reason = if !candidate.path.exists() {
            Some("path does not exist")
        } else if !candidate.path.is_dir() {
            Some("path is not a directory")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(
                    path = %candidate.path.display(),
                    role = candidate.role.as_str(),
                    "skipping layer: {}",
                    reason
                );
                resolved.skipped.push(SkippedLayer {
                    path: candidate.path.clone(),
                    role: candidate.role,
                    reason: reason.to_string(),
                });
            }
            None => {
                let layer = Layer {
                    index: resolved.layers.len(),
                    root: candidate.path.clone(),
                    role: candidate.role,
                };
                debug!(%layer, role = layer.role.as_str(), "resolved layer");
                resolved.layers.push(layer);
            }
        }
    }

    if resolved.layers.is_empty() {
        return Err(LayerError::NoLayers {
            candidates: candidates.len(),
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_preserves_order_and_reindexes() {
        let dir = TempDir::new().unwrap();
        let core = dir.path().join("core");
        let en = dir.path().join("en");
        fs::create_dir(&core).unwrap();
        fs::create_dir(&en).unwrap();

        let candidates = vec![
            LayerCandidate::new(&core, LayerRole::Base),
            LayerCandidate::new(dir.path().join("missing"), LayerRole::Overlay),
            LayerCandidate::new(&en, LayerRole::Overlay),
        ];

        let resolved = resolve_layers(&candidates).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.layers[0].root, core);
        assert_eq!(resolved.layers[0].index, 0);
        assert_eq!(resolved.layers[1].root, en);
        assert_eq!(resolved.layers[1].index, 1);
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].reason, "path does not exist");
    }

    #[test]
    fn test_duplicates_are_distinct_layers() {
        let dir = TempDir::new().unwrap();
        let candidates = vec![
            LayerCandidate::new(dir.path(), LayerRole::Base),
            LayerCandidate::new(dir.path(), LayerRole::Overlay),
        ];

        let resolved = resolve_layers(&candidates).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.layers[1].index, 1);
    }

    #[test]
    fn test_file_is_not_a_layer() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("domain.yml");
        fs::write(&file, "intents: []\n").unwrap();

        let candidates = vec![
            LayerCandidate::new(dir.path(), LayerRole::Base),
            LayerCandidate::new(&file, LayerRole::Overlay),
        ];
        let resolved = resolve_layers(&candidates).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.skipped[0].reason, "path is not a directory");
    }

    #[test]
    fn test_empty_result_is_error() {
        let candidates = vec![LayerCandidate::new("/nonexistent/layer", LayerRole::Base)];
        let result = resolve_layers(&candidates);

        assert!(matches!(result, Err(LayerError::NoLayers { candidates: 1 })));
        assert!(resolve_layers(&[]).is_err());
    }

    #[test]
    fn test_role_kinds() {
        let layer = Layer {
            index: 2,
            root: PathBuf::from("locales/da"),
            role: LayerRole::NluOverlay,
        };
        assert!(layer.contributes(DocumentKind::Nlu));
        assert!(!layer.contributes(DocumentKind::Domain));
        assert!(LayerRole::Base.kinds().contains(&DocumentKind::Config));
        assert_eq!(layer.to_string(), "layer 2 (locales/da)");
    }
}
