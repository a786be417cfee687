use async_trait::async_trait;
use tracing::{info, instrument};

use crate::artifact::Artifact;
use crate::context::RunContext;
use crate::upload::{ReportUpload, UploadClient};

use super::{ActionKind, Stage};

pub struct UploadStage {
    name: String,
    client: UploadClient,
    artifact: Artifact,
    scan_type: String,
}

impl UploadStage {
    pub fn new(
        name: impl Into<String>,
        client: UploadClient,
        artifact: Artifact,
        scan_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            artifact,
            scan_type: scan_type.into(),
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }
}

#[async_trait]
impl Stage for UploadStage {
    #[instrument(skip(self, ctx), fields(stage = %self.name, artifact = %self.artifact.name))]
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let path = self.artifact.resolve(&ctx.workdir);
        let file_name = self.artifact.file_name();
        let report = ReportUpload {
            path: &path,
            file_name: &file_name,
            content_type: self.artifact.content_type,
            scan_type: &self.scan_type,
        };

        let status = self.client.upload(&report).await?.into_result()?;
        info!(
            status,
            product = %self.client.target().product_name,
            engagement = %self.client.target().engagement_name,
            "report delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Upload
    }

    fn describe(&self) -> String {
        format!(
            "upload {} ({}) as '{}'",
            self.artifact.path.display(),
            self.artifact.content_type,
            self.scan_type
        )
    }
}
