use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::artifact::{Artifact, ContentType};
use crate::config::UploadTarget;
use crate::env::{Environment, VarDecl};
use crate::error::ConfigError;
use crate::fetch::ScriptFetcher;
use crate::invoke::CommandSpec;
use crate::pipeline::{FailurePolicy, Pipeline, StagePlan};
use crate::stages::{FetchStage, ToolStage, UploadStage};
use crate::upload::UploadClient;

// ─── Definition schema ───

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDef {
    #[serde(default)]
    pub env: BTreeMap<String, VarDecl>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactDef>,
    pub stages: Vec<StageDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactDef {
    pub path: String,
    pub content_type: ContentType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
    pub name: String,
    #[serde(default)]
    pub run: Option<RunDef>,
    #[serde(default)]
    pub script: Option<ScriptDef>,
    #[serde(default)]
    pub fetch: Option<FetchDef>,
    #[serde(default)]
    pub upload: Option<UploadDef>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub produces: Option<String>,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDef {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptDef {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchDef {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub dest: String,
    #[serde(default = "default_status")]
    pub expect_status: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadDef {
    pub artifact: String,
    pub scan_type: String,
}

fn default_interpreter() -> String {
    "sh".to_string()
}

fn default_status() -> u16 {
    200
}

// ─── Trait impls ───

impl FromStr for PipelineDef {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(s)?)
    }
}

// ─── Methods ───

impl StageDef {
    fn action_count(&self) -> usize {
        [
            self.run.is_some(),
            self.script.is_some(),
            self.fetch.is_some(),
            self.upload.is_some(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }

    /// Template strings in this stage, each with a label for error messages.
    fn templates(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(run) = &self.run {
            out.push(("program", run.program.as_str()));
            out.extend(run.args.iter().map(|a| ("args", a.as_str())));
            out.extend(run.cwd.iter().map(|c| ("cwd", c.as_str())));
            out.extend(run.env.values().map(|v| ("env", v.as_str())));
        }
        if let Some(script) = &self.script {
            out.push(("interpreter", script.interpreter.as_str()));
            out.push(("path", script.path.as_str()));
            out.extend(script.args.iter().map(|a| ("args", a.as_str())));
            out.extend(script.cwd.iter().map(|c| ("cwd", c.as_str())));
            out.extend(script.env.values().map(|v| ("env", v.as_str())));
        }
        if let Some(fetch) = &self.fetch {
            out.push(("url", fetch.url.as_str()));
            out.extend(fetch.token.iter().map(|t| ("token", t.as_str())));
            out.push(("dest", fetch.dest.as_str()));
        }
        out
    }

    /// Declared requirements plus the uploaded artifact, without duplicates.
    fn required_artifacts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.requires.iter().map(String::as_str).collect();
        if let Some(upload) = &self.upload
            && !names.contains(&upload.artifact.as_str())
        {
            names.push(&upload.artifact);
        }
        names
    }
}

impl PipelineDef {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Resolve declared variables and add the built-ins.
    pub fn environment<F>(
        &self,
        target: &UploadTarget,
        workdir: &Path,
        lookup: F,
    ) -> Result<Environment, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Environment::resolve(&self.env, lookup)?;
        env.set("WORKDIR", workdir.display().to_string());
        env.set("BACKEND_URL", target.backend_url.clone());
        env.set_secret("BACKEND_TOKEN", target.token.clone());
        env.set("PRODUCT_NAME", target.product_name.clone());
        env.set("ENGAGEMENT_NAME", target.engagement_name.clone());
        env.set("TAGS", target.tags.clone());
        Ok(env)
    }

    /// Check everything that can be checked without running a stage.
    pub fn validate(&self, env: &Environment) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::Empty("stage name".into()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }

            let found = stage.action_count();
            if found != 1 {
                return Err(ConfigError::StageAction {
                    stage: stage.name.clone(),
                    found,
                });
            }

            for artifact in stage.required_artifacts().into_iter().chain(stage.produces.as_deref()) {
                if !self.artifacts.contains_key(artifact) {
                    return Err(ConfigError::UnknownArtifact {
                        stage: stage.name.clone(),
                        artifact: artifact.to_string(),
                    });
                }
            }

            for (field, template) in stage.templates() {
                env.check(template, &format!("stage '{}' {field}", stage.name))?;
            }

            if let Some(upload) = &stage.upload {
                if upload.scan_type.trim().is_empty() {
                    return Err(ConfigError::Empty(format!("scan_type of stage '{}'", stage.name)));
                }
                let def = &self.artifacts[&upload.artifact];
                if !def.content_type.is_report() {
                    return Err(ConfigError::NotUploadable {
                        stage: stage.name.clone(),
                        artifact: upload.artifact.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn artifact(&self, name: &str) -> Artifact {
        let def = &self.artifacts[name];
        Artifact::new(name, &def.path, def.content_type)
    }

    /// Validate and turn the definition into a runnable pipeline.
    pub fn build(
        &self,
        env: &Environment,
        fetcher: &ScriptFetcher,
        uploader: &UploadClient,
    ) -> Result<Pipeline, ConfigError> {
        self.validate(env)?;

        let mut builder = Pipeline::builder();
        for def in &self.stages {
            let mut plan = if let Some(run) = &def.run {
                StagePlan::new(ToolStage::new(
                    &def.name,
                    CommandSpec {
                        program: run.program.clone(),
                        args: run.args.clone(),
                        cwd: run.cwd.clone(),
                        env: run.env.clone(),
                    },
                ))
            } else if let Some(script) = &def.script {
                let command = CommandSpec {
                    program: String::new(),
                    args: script.args.clone(),
                    cwd: script.cwd.clone(),
                    env: script.env.clone(),
                };
                StagePlan::new(ToolStage::script(
                    &def.name,
                    &script.interpreter,
                    &script.path,
                    command,
                ))
            } else if let Some(fetch) = &def.fetch {
                let mut stage = FetchStage::new(&def.name, fetcher.clone(), &fetch.url, &fetch.dest)
                    .expect_status(fetch.expect_status);
                if let Some(token) = &fetch.token {
                    stage = stage.token(token);
                }
                StagePlan::new(stage)
            } else if let Some(upload) = &def.upload {
                StagePlan::new(UploadStage::new(
                    &def.name,
                    uploader.clone(),
                    self.artifact(&upload.artifact),
                    &upload.scan_type,
                ))
            } else {
                return Err(ConfigError::StageAction {
                    stage: def.name.clone(),
                    found: 0,
                });
            };

            for name in def.required_artifacts() {
                plan = plan.requires(self.artifact(name));
            }
            if let Some(name) = &def.produces {
                plan = plan.produces(self.artifact(name));
            }
            builder = builder.stage(plan.on_failure(def.on_failure));
        }
        Ok(builder.build())
    }
}
