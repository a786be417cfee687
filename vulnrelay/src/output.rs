use crate::pipeline::{FailurePolicy, Pipeline};
use crate::report::{RunReport, StageOutcome};

pub trait OutputFormatter {
    fn write_report(&self, report: &RunReport, writer: &mut dyn std::io::Write) -> std::io::Result<()>;
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_report(&self, report: &RunReport, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for stage in &report.stages {
            let outcome = match stage.outcome {
                StageOutcome::Succeeded => "ok",
                StageOutcome::Tolerated => "failed (tolerated)",
                StageOutcome::Failed => "FAILED",
            };
            writeln!(
                writer,
                "{:<28} {:<7} {:>8}ms  {outcome}",
                stage.name, stage.kind, stage.duration_ms
            )?;
            if let Some(err) = &stage.error {
                for line in err.lines() {
                    writeln!(writer, "    {line}")?;
                }
            }
        }
        writeln!(writer, "status: {}", report.status)?;
        if let Some(err) = &report.error {
            writeln!(writer, "error: {err}")?;
        }
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_report(&self, report: &RunReport, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}

/// Print the stages a pipeline would run, without running them.
pub fn write_plan(pipeline: &Pipeline, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
    for (i, plan) in pipeline.stages().iter().enumerate() {
        let stage = plan.stage();
        writeln!(writer, "{}. {}: {}", i + 1, stage.name(), stage.describe())?;
        for artifact in plan.required() {
            writeln!(writer, "     requires {} ({})", artifact.name, artifact.path.display())?;
        }
        if let Some(artifact) = plan.produced() {
            writeln!(writer, "     produces {} ({})", artifact.name, artifact.path.display())?;
        }
        if plan.policy() == FailurePolicy::Continue {
            writeln!(writer, "     on failure: continue")?;
        }
    }
    Ok(())
}
