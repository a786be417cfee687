use std::time::Duration;

use serde::Serialize;

use crate::error::PipelineError;
use crate::stages::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    /// Every stage ran; at least one failure was tolerated by policy.
    SuccessWithWarnings,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::SuccessWithWarnings => "success-with-warnings",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Succeeded,
    /// The action failed but the stage's policy let the run continue.
    Tolerated,
    Failed,
}

/// One line of the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub kind: ActionKind,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    pub fn new(name: &str, kind: ActionKind, outcome: StageOutcome, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            kind,
            outcome,
            duration_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of a whole pipeline run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<PipelineError>,
}

impl RunReport {
    pub fn completed(stages: Vec<StageRecord>) -> Self {
        let status = if stages.iter().any(|s| s.outcome == StageOutcome::Tolerated) {
            RunStatus::SuccessWithWarnings
        } else {
            RunStatus::Success
        };
        Self {
            status,
            stages,
            error: None,
            failure: None,
        }
    }

    pub fn aborted(stages: Vec<StageRecord>, failure: PipelineError) -> Self {
        Self {
            status: RunStatus::Failed,
            stages,
            error: Some(failure.to_string()),
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, PipelineError::exit_code)
    }

    pub fn record(&self, stage: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == stage)
    }
}
