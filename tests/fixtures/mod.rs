//! Layer stack fixtures
//!
//! Builds throwaway layer directories under a temp dir so tests can
//! describe a stack as a handful of YAML files.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use layerstack::Settings;
use tempfile::TempDir;

/// A temp directory holding any number of layer directories.
pub struct Stack {
    dir: TempDir,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Path of a layer (or any file) relative to the stack root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Create an empty layer directory.
    pub fn layer(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        fs::create_dir_all(&path).expect("create layer dir");
        path
    }

    /// Write a file inside a layer, creating directories as needed.
    pub fn write(&self, layer: &str, rel: &str, contents: &str) -> PathBuf {
        let path = self.layer(layer).join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Settings with a base layer and domain overlays in the given order.
    pub fn settings(&self, base: &str, overlays: &[&str]) -> Settings {
        Settings {
            base_domain: Some(self.path(base)),
            overlay_domain: overlays.iter().map(|name| self.path(name)).collect(),
            ..Settings::default()
        }
    }
}

/// The two-layer project used by several tests: a core layer with a
/// greeting and an English layer that adds a farewell and rewords the greeting.
pub fn greeting_stack() -> Stack {
    let stack = Stack::new();
    stack.write(
        "core",
        "domain.yml",
        r#"version: "3.1"
intents:
  - greet
responses:
  utter_greet:
    - text: "Hello!"
"#,
    );
    stack.write("core", "config.yml", "language: en\npipeline: []\n");
    stack.write(
        "core",
        "data/nlu.yml",
        r#"version: "3.1"
nlu:
  - intent: greet
    examples: |
      - hello
      - hi
"#,
    );
    stack.write(
        "en",
        "domain.yml",
        r#"intents:
  - goodbye
responses:
  utter_greet:
    - text: "Hi there!"
    - text: "Welcome!"
"#,
    );
    stack.write(
        "en",
        "data/nlu.yml",
        r#"nlu:
  - intent: goodbye
    examples: |
      - bye
      - see you
"#,
    );
    stack
}
