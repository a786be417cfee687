use std::path::PathBuf;

use thiserror::Error;

use crate::stages::ActionKind;

pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_ARTIFACT: i32 = 3;
pub const EXIT_TOOL: i32 = 4;
pub const EXIT_UPLOAD: i32 = 5;

/// Problems found while loading the pipeline definition or assembling the
/// run environment. All of these are raised before any stage executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pipeline definition {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("required variable {name} is not set (expected in environment variable {from})")]
    MissingVar { name: String, from: String },

    #[error("{0} must not be empty")]
    Empty(String),

    #[error("{field} must be an http:// or https:// URL, got '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("unknown variable ${{{name}}} referenced in {location}")]
    UndeclaredVar { name: String, location: String },

    #[error("unterminated placeholder in {location}")]
    UnterminatedPlaceholder { location: String },

    #[error("variable {0} shadows a built-in variable")]
    ReservedVar(String),

    #[error("duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("stage '{stage}' must declare exactly one of run, script, fetch, upload (found {found})")]
    StageAction { stage: String, found: usize },

    #[error("stage '{stage}' references undeclared artifact '{artifact}'")]
    UnknownArtifact { stage: String, artifact: String },

    #[error("stage '{stage}' uploads artifact '{artifact}' whose content type cannot be uploaded")]
    NotUploadable { stage: String, artifact: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Run-level failure. Every variant names the stage that stopped the run,
/// except configuration errors which happen before the first stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stage '{stage}' requires artifact '{artifact}' but {} is missing or empty", path.display())]
    Precondition {
        stage: String,
        artifact: String,
        path: PathBuf,
    },

    #[error("stage '{stage}' reported success but did not produce artifact '{artifact}' at {}", path.display())]
    Postcondition {
        stage: String,
        artifact: String,
        path: PathBuf,
    },

    #[error("stage '{stage}' failed: {message}")]
    Execution {
        stage: String,
        kind: ActionKind,
        message: String,
    },
}

impl PipelineError {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Precondition { .. } | Self::Postcondition { .. } => EXIT_ARTIFACT,
            Self::Execution { kind: ActionKind::Upload, .. } => EXIT_UPLOAD,
            Self::Execution { .. } => EXIT_TOOL,
        }
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Config(_) => None,
            Self::Precondition { stage, .. }
            | Self::Postcondition { stage, .. }
            | Self::Execution { stage, .. } => Some(stage),
        }
    }
}
