pub mod fetch;
pub mod tool;
pub mod upload;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::context::RunContext;

/// What a stage does, as declared in the pipeline definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Invoke an external tool.
    Run,
    /// Run a local script through an interpreter.
    Script,
    /// Download a file over HTTP.
    Fetch,
    /// Send a report to the findings backend.
    Upload,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Run => "run",
            Self::Script => "script",
            Self::Fetch => "fetch",
            Self::Upload => "upload",
        })
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()>;
    fn name(&self) -> &str;
    fn kind(&self) -> ActionKind;

    /// Human-readable summary used by `--check`. Must not contain secrets.
    fn describe(&self) -> String {
        self.kind().to_string()
    }
}

pub use fetch::FetchStage;
pub use tool::ToolStage;
pub use upload::UploadStage;
