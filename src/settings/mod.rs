//! Settings
//!
//! Implements the 4-layer settings merge:
//! 1. Built-in defaults
//! 2. Settings file (`layerstack.toml` or `--settings`)
//! 3. `OVERLAY_*` environment variables
//! 4. CLI flags

mod defaults;
mod effective;

pub use defaults::{BuiltinDefaults, SETTINGS_FILE};
pub use effective::{
    parse_comma_list, EffectiveSettings, SettingsError, SettingsOrigin, SettingsSource, ENV_VARS,
};

use std::collections::BTreeMap;
use std::path::PathBuf;

use layerstack_merge::{PolicyError, PolicyTable};
use serde::{Deserialize, Serialize};

use crate::domain::default_domain_policies;
use crate::layer::{LayerCandidate, LayerRole};

/// Typed settings value object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base layer directory
    pub base_domain: Option<PathBuf>,

    /// Overlay layer directories, lowest precedence first
    pub overlay_domain: Vec<PathBuf>,

    /// Overlay directories contributing NLU data only
    pub overlay_nlu: Vec<PathBuf>,

    /// Overlay directories contributing stories and rules only
    pub overlay_stories: Vec<PathBuf>,

    /// Dump selector for the merged domain
    pub dump_domain: Option<String>,

    /// Dump selector for the merged NLU data
    pub dump_nlu: Option<String>,

    /// Directory receiving the full merged project
    pub export_dir: Option<PathBuf>,

    /// Where the project info summary is written
    pub info_file: Option<PathBuf>,

    /// Pipeline config used when no layer provides one
    pub default_config: Option<PathBuf>,

    /// Domain section policy overrides (`pattern = policy`)
    pub policies: BTreeMap<String, String>,
}

impl Settings {
    /// Ordered layer candidates: base, overlays, NLU overlays, story overlays.
    pub fn candidates(&self) -> Vec<LayerCandidate> {
        let mut candidates = Vec::new();
        if let Some(base) = &self.base_domain {
            candidates.push(LayerCandidate::new(base, LayerRole::Base));
        }
        let groups = [
            (&self.overlay_domain, LayerRole::Overlay),
            (&self.overlay_nlu, LayerRole::NluOverlay),
            (&self.overlay_stories, LayerRole::StoriesOverlay),
        ];
        for (paths, role) in groups {
            candidates.extend(paths.iter().map(|path| LayerCandidate::new(path, role)));
        }
        candidates
    }

    /// Built-in domain policies with the configured overrides applied.
    pub fn domain_policies(&self) -> Result<PolicyTable, PolicyError> {
        let mut table = default_domain_policies();
        table.extend_from_map(&self.policies)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerstack_merge::MergePolicy;

    #[test]
    fn test_candidates_order() {
        let settings = Settings {
            base_domain: Some(PathBuf::from("core")),
            overlay_domain: vec![PathBuf::from("en"), PathBuf::from("en-us")],
            overlay_nlu: vec![PathBuf::from("nlu-extra")],
            overlay_stories: vec![PathBuf::from("stories-extra")],
            ..Settings::default()
        };

        let candidates = settings.candidates();
        let summary: Vec<_> = candidates
            .iter()
            .map(|c| (c.path.to_string_lossy().to_string(), c.role))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("core".to_string(), LayerRole::Base),
                ("en".to_string(), LayerRole::Overlay),
                ("en-us".to_string(), LayerRole::Overlay),
                ("nlu-extra".to_string(), LayerRole::NluOverlay),
                ("stories-extra".to_string(), LayerRole::StoriesOverlay),
            ]
        );
    }

    #[test]
    fn test_policy_override() {
        let mut settings = Settings::default();
        settings
            .policies
            .insert("responses.*".to_string(), "append".to_string());

        let table = settings.domain_policies().unwrap();

        assert_eq!(
            table.lookup(&["responses".to_string(), "utter_x".to_string()]),
            Some(MergePolicy::Append)
        );
        assert_eq!(
            table.lookup(&["intents".to_string()]),
            Some(MergePolicy::Merge)
        );
    }
}
