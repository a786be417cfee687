use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::context::RunContext;
use crate::fetch::ScriptFetcher;

use super::{ActionKind, Stage};

pub struct FetchStage {
    name: String,
    fetcher: ScriptFetcher,
    url: String,
    token: Option<String>,
    dest: String,
    expect_status: u16,
}

impl FetchStage {
    pub fn new(
        name: impl Into<String>,
        fetcher: ScriptFetcher,
        url: impl Into<String>,
        dest: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            url: url.into(),
            token: None,
            dest: dest.into(),
            expect_status: 200,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expect_status = status;
        self
    }
}

#[async_trait]
impl Stage for FetchStage {
    #[instrument(skip(self, ctx), fields(stage = %self.name))]
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let url = ctx.env.render(&self.url).context("failed to render fetch URL")?;
        let token = self
            .token
            .as_deref()
            .map(|t| ctx.env.render(t))
            .transpose()
            .context("failed to render fetch token")?;
        let dest = ctx.path(ctx.env.render(&self.dest)?.expose());

        info!(url = %url.redacted(), dest = %dest.display(), "fetching");
        self.fetcher
            .fetch_to(
                url.expose(),
                token.as_ref().map(|t| t.expose()),
                self.expect_status,
                &dest,
            )
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Fetch
    }

    fn describe(&self) -> String {
        format!("fetch {} -> {}", self.url, self.dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::fetch::TOKEN_HEADER;
    use crate::secret::Secret;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn renders_url_and_token_from_env() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/9/repository/files/enhance.py/raw"))
            .and(header(TOKEN_HEADER, "glpat-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("import os\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new();
        env.set("HOST", server.uri());
        env.set_secret("GITLAB_TOKEN", Secret::new("glpat-xyz"));
        let ctx = RunContext::new(dir.path(), env);

        let stage = FetchStage::new(
            "fetch-enhancer",
            ScriptFetcher::new(reqwest::Client::new()),
            "${HOST}/api/v4/projects/9/repository/files/enhance.py/raw",
            "enhance.py",
        )
        .token("${GITLAB_TOKEN}");

        stage.run(&ctx).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("enhance.py")).unwrap();
        assert_eq!(written, "import os\n");
    }

    #[tokio::test]
    async fn status_mismatch_fails_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), Environment::new());
        let stage = FetchStage::new(
            "fetch",
            ScriptFetcher::new(reqwest::Client::new()),
            server.uri(),
            "enhance.py",
        );

        let err = stage.run(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(!dir.path().join("enhance.py").exists());
    }

    #[test]
    fn describe_does_not_render() {
        let stage = FetchStage::new(
            "fetch",
            ScriptFetcher::new(reqwest::Client::new()),
            "${HOST}/file",
            "enhance.py",
        )
        .token("${TOKEN}");
        assert_eq!(stage.describe(), "fetch ${HOST}/file -> enhance.py");
    }
}
