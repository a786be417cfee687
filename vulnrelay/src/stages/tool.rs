use anyhow::{bail, Context};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::context::RunContext;
use crate::invoke::{CommandSpec, OUTPUT_TAIL_LINES};

use super::{ActionKind, Stage};

/// Runs an external scanner, or a local script through its interpreter.
pub struct ToolStage {
    name: String,
    kind: ActionKind,
    command: CommandSpec,
}

impl ToolStage {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Run,
            command,
        }
    }

    /// `interpreter path args...`
    pub fn script(
        name: impl Into<String>,
        interpreter: impl Into<String>,
        path: impl Into<String>,
        mut command: CommandSpec,
    ) -> Self {
        command.program = interpreter.into();
        command.args.insert(0, path.into());
        Self {
            name: name.into(),
            kind: ActionKind::Script,
            command,
        }
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }
}

#[async_trait]
impl Stage for ToolStage {
    #[instrument(skip(self, ctx), fields(stage = %self.name))]
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let invocation = self
            .command
            .render(&ctx.env)
            .context("failed to render command")?;
        info!(command = %invocation.command_line(), "invoking");

        let output = invocation.execute(&ctx.workdir, &ctx.env).await?;
        if !output.stdout.is_empty() {
            debug!(stdout = %output.stdout.trim_end(), "captured stdout");
        }
        if !output.stderr.is_empty() {
            debug!(stderr = %output.stderr.trim_end(), "captured stderr");
        }

        if !output.success() {
            let status = match output.code {
                Some(code) => format!("exited with code {code}"),
                None => "was terminated by a signal".to_string(),
            };
            let tail = output.tail(OUTPUT_TAIL_LINES);
            if tail.is_empty() {
                bail!("'{}' {status}", invocation.command_line());
            }
            bail!("'{}' {status}:\n{tail}", invocation.command_line());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn describe(&self) -> String {
        let mut line = format!("{} {}", self.kind, self.command.program);
        for arg in &self.command.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
