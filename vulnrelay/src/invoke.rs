use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::env::{Environment, Rendered};
use crate::error::ConfigError;

/// Number of trailing output lines attached to a failure.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// A command line whose parts may contain `${VAR}` placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Substitute variables. Secrets are resolved here and nowhere earlier.
    pub fn render(&self, env: &Environment) -> Result<Invocation, ConfigError> {
        Ok(Invocation {
            program: env.render(&self.program)?,
            args: self
                .args
                .iter()
                .map(|a| env.render(a))
                .collect::<Result<_, _>>()?,
            cwd: self
                .cwd
                .as_deref()
                .map(|c| env.render(c).map(|r| PathBuf::from(r.into_value())))
                .transpose()?,
            env: self
                .env
                .iter()
                .map(|(k, v)| env.render(v).map(|r| (k.clone(), r)))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// A fully rendered command, ready to spawn.
///
/// `Debug` shows only the redacted command line.
pub struct Invocation {
    program: Rendered,
    args: Vec<Rendered>,
    cwd: Option<PathBuf>,
    env: Vec<(String, Rendered)>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last lines of stderr, or of stdout when stderr is empty.
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.trim_end().lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.command_line())
            .field("cwd", &self.cwd)
            .field("env", &self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl Invocation {
    /// The command line as it may appear in logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.redacted().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg.redacted());
        }
        line
    }

    /// Spawn the command in `workdir` (or its own `cwd` below it) and wait
    /// for it to exit. Captured output is scrubbed of `env`'s secrets.
    #[instrument(skip_all, fields(command = %self.command_line()))]
    pub async fn execute(&self, workdir: &Path, env: &Environment) -> Result<ToolOutput> {
        let dir = match &self.cwd {
            Some(cwd) if cwd.is_absolute() => cwd.clone(),
            Some(cwd) => workdir.join(cwd),
            None => workdir.to_path_buf(),
        };

        let mut command = tokio::process::Command::new(self.program.expose());
        command
            .args(self.args.iter().map(Rendered::expose))
            .current_dir(&dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.expose())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cwd = %dir.display(), "spawning");
        let output = command
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.program.redacted()))?;

        let result = ToolOutput {
            code: output.status.code(),
            stdout: env.scrub(&String::from_utf8_lossy(&output.stdout)),
            stderr: env.scrub(&String::from_utf8_lossy(&output.stderr)),
        };
        debug!(code = ?result.code, stdout_bytes = output.stdout.len(), stderr_bytes = output.stderr.len(), "process exited");
        Ok(result)
    }
}
