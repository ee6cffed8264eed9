//! Artifact export
//!
//! Serializes merged documents to a destination. Export reads the merge
//! result and never changes it; exporting the same result twice produces
//! identical bytes.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::loader::DocumentKind;

/// Where an exported document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Discard,
    Stdout,
    File(PathBuf),
}

impl Destination {
    /// Parse a dump selector: empty means discard, `1`/`true`/`yes`/`stdout`/`-`
    /// mean stdout, anything else is a file path.
    pub fn from_selector(selector: Option<&str>) -> Self {
        let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
            return Destination::Discard;
        };
        match selector.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "stdout" | "-" => Destination::Stdout,
            _ => Destination::File(PathBuf::from(selector)),
        }
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Destination::Discard)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Discard => write!(f, "discard"),
            Destination::Stdout => write!(f, "stdout"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize {kind} document: {source}")]
    Yaml {
        kind: DocumentKind,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Render a document as YAML.
pub fn to_yaml(kind: DocumentKind, value: &Value) -> Result<String, ExportError> {
    serde_yaml::to_string(value).map_err(|source| ExportError::Yaml { kind, source })
}

/// Export one document. `stdout` receives output for [`Destination::Stdout`].
pub fn export_document(
    kind: DocumentKind,
    value: &Value,
    destination: &Destination,
    stdout: &mut dyn Write,
) -> Result<(), ExportError> {
    match destination {
        Destination::Discard => Ok(()),
        Destination::Stdout => {
            let yaml = to_yaml(kind, value)?;
            stdout
                .write_all(yaml.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|source| ExportError::Io {
                    path: PathBuf::from("<stdout>"),
                    source,
                })
        }
        Destination::File(path) => write_file(path, to_yaml(kind, value)?.as_bytes()),
    }
}

/// Export a set of documents into a directory; `raw` entries are copied verbatim.
///
/// Returns the written paths in order.
pub fn export_directory(
    dir: &Path,
    documents: &[(DocumentKind, &Value)],
    raw: &[(DocumentKind, &str)],
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::with_capacity(documents.len() + raw.len());

    for (kind, value) in documents {
        let path = dir.join(kind.file_name());
        write_file(&path, to_yaml(*kind, value)?.as_bytes())?;
        written.push(path);
    }
    for (kind, text) in raw {
        let path = dir.join(kind.file_name());
        write_file(&path, text.as_bytes())?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "exported project");
    Ok(written)
}

/// Write a file, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
