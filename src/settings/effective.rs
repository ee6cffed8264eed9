//! Effective settings with full provenance
//!
//! The effective settings capture the merged settings value plus
//! information about where each source came from.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use layerstack_merge::{MergePolicy, Merger, PolicyError, PolicyTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::Settings;
use crate::loader::sha256_hex;

/// Environment variables and the settings field each one sets.
/// List-valued fields take comma separated paths.
pub const ENV_VARS: &[(&str, &str, bool)] = &[
    ("OVERLAY_BASE_DOMAIN", "base_domain", false),
    ("OVERLAY_DOMAIN", "overlay_domain", true),
    ("OVERLAY_NLU", "overlay_nlu", true),
    ("OVERLAY_STORIES", "overlay_stories", true),
    ("OVERLAY_DUMP_DOMAIN", "dump_domain", false),
    ("OVERLAY_DUMP_NLU", "dump_nlu", false),
    ("OVERLAY_EXPORT_DIR", "export_dir", false),
    ("OVERLAY_INFO_FILE", "info_file", false),
    ("OVERLAY_DEFAULT_CONFIG", "default_config", false),
];

/// Origin of a settings source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing settings source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSource {
    pub origin: SettingsOrigin,

    /// File path (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Environment variables that contributed (env only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

impl SettingsSource {
    fn new(origin: SettingsOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
            variables: Vec::new(),
        }
    }
}

/// Effective settings with full provenance
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSettings {
    /// When these settings were computed
    pub created_at: DateTime<Utc>,

    /// Typed view of the merged value
    pub settings: Settings,

    /// The merged settings object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<SettingsSource>,
}

/// Settings sources merge field by field: a later list replaces an earlier one.
fn settings_merger() -> Merger {
    Merger::new(
        PolicyTable::new()
            .with_rule("overlay_domain", MergePolicy::Replace)
            .with_rule("overlay_nlu", MergePolicy::Replace)
            .with_rule("overlay_stories", MergePolicy::Replace),
    )
}

impl EffectiveSettings {
    /// Build effective settings from the layered sources.
    ///
    /// `file` must exist when given. `env` is the process environment (or any
    /// subset of it); only the `OVERLAY_*` variables are read.
    pub fn build(
        file: Option<&Path>,
        env: &BTreeMap<String, String>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, SettingsError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        // Layer 1: Built-in defaults
        layers.push(BuiltinDefaults::default().to_value());
        sources.push(SettingsSource::new(SettingsOrigin::Builtin));

        // Layer 2: Settings file
        if let Some(path) = file {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(SettingsSource {
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
                ..SettingsSource::new(SettingsOrigin::File)
            });
        }

        // Layer 3: Environment
        let (env_value, variables) = Self::env_to_value(env);
        if !variables.is_empty() {
            layers.push(env_value);
            sources.push(SettingsSource {
                variables,
                ..SettingsSource::new(SettingsOrigin::Env)
            });
        }

        // Layer 4: CLI overrides
        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(SettingsSource::new(SettingsOrigin::Cli));
        }

        let merged = settings_merger().merge(layers);
        let settings: Settings = serde_json::from_value(merged.clone())
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;

        // Surface unknown policy names now rather than mid-merge.
        settings.domain_policies()?;

        debug!(sources = sources.len(), "settings resolved");
        Ok(Self {
            created_at: Utc::now(),
            settings,
            config: merged,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), SettingsError> {
        let bytes = fs::read(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = sha256_hex(&bytes);

        let contents = String::from_utf8(bytes).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8: {}", e),
        })?;

        let toml_value: toml::Value = toml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok((toml_to_json(toml_value), digest))
    }

    /// Collect `OVERLAY_*` variables into a settings object.
    ///
    /// Empty variables and lists that parse to nothing are ignored so they
    /// never clear a lower-precedence value.
    fn env_to_value(env: &BTreeMap<String, String>) -> (Value, Vec<String>) {
        let mut map = Map::new();
        let mut variables = Vec::new();

        for &(var, field, is_list) in ENV_VARS {
            let Some(raw) = env.get(var).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = if is_list {
                let paths = parse_comma_list(raw);
                if paths.is_empty() {
                    continue;
                }
                Value::Array(paths.into_iter().map(Value::String).collect())
            } else {
                Value::String(raw.to_string())
            };
            map.insert(field.to_string(), value);
            variables.push(var.to_string());
        }

        (Value::Object(map), variables)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a settings value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a settings value as string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn parse_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("invalid merge policy: {0}")]
    Policy(#[from] PolicyError),
}
