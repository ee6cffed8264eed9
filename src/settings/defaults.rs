//! Built-in defaults (lowest precedence)

use serde::{Deserialize, Serialize};

/// Default name of the settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "layerstack.toml";

/// Built-in default settings values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Fallback pipeline config (default: "config.yml")
    pub default_config: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            default_config: "config.yml".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "overlay_domain": [],
            "overlay_nlu": [],
            "overlay_stories": [],
            "default_config": self.default_config,
            "policies": {}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["default_config"], "config.yml");
        assert_eq!(value["overlay_domain"], serde_json::json!([]));
        assert!(value.get("base_domain").is_none());
    }
}
