pub mod artifact;
pub mod config;
pub mod context;
pub mod definition;
pub mod env;
pub mod error;
pub mod fetch;
pub mod invoke;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod secret;
pub mod stages;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use config::{HttpOptions, UploadTarget};
use context::RunContext;
use definition::PipelineDef;
use error::ConfigError;
use fetch::ScriptFetcher;
use pipeline::Pipeline;
use report::RunReport;
use upload::UploadClient;

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pipeline_file: PathBuf,
    pub workdir: PathBuf,
    pub target: UploadTarget,
    pub http: HttpOptions,
}

/// A validated pipeline bound to its environment, ready to execute.
pub struct Relay {
    pipeline: Pipeline,
    context: RunContext,
}

impl Relay {
    /// Load the definition, resolve variables through `lookup` and validate
    /// everything. No stage runs before this succeeds.
    #[instrument(skip_all, fields(pipeline = %config.pipeline_file.display()))]
    pub fn prepare<F>(config: RunConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.target.validate()?;
        let def = PipelineDef::load(&config.pipeline_file)?;
        let env = def.environment(&config.target, &config.workdir, lookup)?;

        let client = config.http.client()?;
        let fetcher = ScriptFetcher::new(client.clone());
        let uploader = UploadClient::new(client, Arc::new(config.target), &config.http);
        let pipeline = def.build(&env, &fetcher, &uploader)?;
        debug!(stages = pipeline.stage_count(), "pipeline prepared");

        Ok(Self {
            pipeline,
            context: RunContext::new(config.workdir, env),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run(&self) -> RunReport {
        self.pipeline.run(&self.context).await
    }
}
