use std::time::Instant;

use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::artifact::Artifact;
use crate::context::RunContext;
use crate::error::PipelineError;
use crate::report::{RunReport, StageOutcome, StageRecord};
use crate::stages::Stage;

/// What to do when a stage's own action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// A stage plus the artifacts it consumes and produces.
pub struct StagePlan {
    stage: Box<dyn Stage>,
    requires: Vec<Artifact>,
    produces: Option<Artifact>,
    on_failure: FailurePolicy,
}

impl StagePlan {
    pub fn new(stage: impl Stage + 'static) -> Self {
        Self {
            stage: Box::new(stage),
            requires: vec![],
            produces: None,
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn requires(mut self, artifact: Artifact) -> Self {
        self.requires.push(artifact);
        self
    }

    pub fn produces(mut self, artifact: Artifact) -> Self {
        self.produces = Some(artifact);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }

    pub fn required(&self) -> &[Artifact] {
        &self.requires
    }

    pub fn produced(&self) -> Option<&Artifact> {
        self.produces.as_ref()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.on_failure
    }
}

enum Step {
    Done(StageRecord),
    Abort(StageRecord, PipelineError),
}

pub struct Pipeline {
    stages: Vec<StagePlan>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { stages: vec![] }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[StagePlan] {
        &self.stages
    }

    /// Execute stages strictly in order, stopping at the first fatal error.
    #[instrument(skip_all, fields(stage_count = self.stages.len(), workdir = %ctx.workdir.display()))]
    pub async fn run(&self, ctx: &RunContext) -> RunReport {
        let mut records = Vec::with_capacity(self.stages.len());
        for plan in &self.stages {
            match Self::run_stage(plan, ctx).await {
                Step::Done(record) => records.push(record),
                Step::Abort(record, err) => {
                    records.push(record);
                    error!(stage = plan.stage.name(), error = %err, "pipeline aborted");
                    return RunReport::aborted(records, err);
                }
            }
        }

        let report = RunReport::completed(records);
        info!(status = %report.status, "pipeline finished");
        report
    }

    #[instrument(skip_all, fields(stage = plan.stage.name(), kind = %plan.stage.kind()))]
    async fn run_stage(plan: &StagePlan, ctx: &RunContext) -> Step {
        let stage = plan.stage.as_ref();
        let started = Instant::now();

        for artifact in &plan.requires {
            if !artifact.is_present(&ctx.workdir).await {
                let err = PipelineError::Precondition {
                    stage: stage.name().to_string(),
                    artifact: artifact.name.clone(),
                    path: artifact.resolve(&ctx.workdir),
                };
                let record = StageRecord::new(stage.name(), stage.kind(), StageOutcome::Failed, started.elapsed())
                    .with_error(err.to_string());
                return Step::Abort(record, err);
            }
        }

        info!("stage started");
        if let Err(e) = stage.run(ctx).await {
            let message = ctx.env.scrub(&format!("{e:#}"));
            let elapsed = started.elapsed();
            return match plan.on_failure {
                FailurePolicy::Continue => {
                    warn!(error = %message, "stage failed, continuing");
                    Step::Done(
                        StageRecord::new(stage.name(), stage.kind(), StageOutcome::Tolerated, elapsed)
                            .with_error(message),
                    )
                }
                FailurePolicy::Abort => {
                    let record = StageRecord::new(stage.name(), stage.kind(), StageOutcome::Failed, elapsed)
                        .with_error(message.clone());
                    let err = PipelineError::Execution {
                        stage: stage.name().to_string(),
                        kind: stage.kind(),
                        message,
                    };
                    Step::Abort(record, err)
                }
            };
        }

        if let Some(artifact) = &plan.produces
            && !artifact.is_present(&ctx.workdir).await
        {
            let err = PipelineError::Postcondition {
                stage: stage.name().to_string(),
                artifact: artifact.name.clone(),
                path: artifact.resolve(&ctx.workdir),
            };
            let record = StageRecord::new(stage.name(), stage.kind(), StageOutcome::Failed, started.elapsed())
                .with_error(err.to_string());
            return Step::Abort(record, err);
        }

        let elapsed = started.elapsed();
        info!(duration_ms = elapsed.as_millis() as u64, "stage complete");
        Step::Done(StageRecord::new(stage.name(), stage.kind(), StageOutcome::Succeeded, elapsed))
    }
}

pub struct PipelineBuilder {
    stages: Vec<StagePlan>,
}

impl PipelineBuilder {
    pub fn stage(mut self, plan: StagePlan) -> Self {
        self.stages.push(plan);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}
