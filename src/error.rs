//! Error taxonomy and stable exit codes

use std::io;

use serde::{Deserialize, Serialize};

use crate::consolidate::ConflictError;
use crate::export::ExportError;
use crate::layer::LayerError;
use crate::loader::LoadError;
use crate::select::SelectError;
use crate::settings::SettingsError;

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Artifacts produced
    Success = 0,
    /// Export, report or serialization failure
    Output = 1,
    /// No usable layers, settings or pipeline config
    Config = 2,
    /// Malformed source document
    Load = 3,
    /// Entity type conflict or ambiguous synonym
    Conflict = 4,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Any failure of a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("failed to write project info: {0}")]
    Report(#[source] io::Error),

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PipelineError {
    /// Exit code the binary reports for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PipelineError::Settings(_) | PipelineError::Layer(_) => ExitCode::Config,
            PipelineError::Select(SelectError::NoPipelineConfig { .. }) => ExitCode::Config,
            PipelineError::Select(SelectError::Load(_)) | PipelineError::Load(_) => ExitCode::Load,
            PipelineError::Conflict(_) => ExitCode::Conflict,
            PipelineError::Export(_) | PipelineError::Report(_) | PipelineError::Serialize(_) => {
                ExitCode::Output
            }
        }
    }
}
