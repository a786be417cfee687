use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, instrument};

/// Header carrying the access token for the script host.
pub const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Downloads single files from a source-hosting HTTP endpoint.
#[derive(Clone)]
pub struct ScriptFetcher {
    client: reqwest::Client,
}

impl ScriptFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch `url` and write the body verbatim to `dest`.
    ///
    /// Only `expect_status` is accepted; any other status, a transport
    /// error, or an empty body is a failure. Returns the number of bytes
    /// written.
    #[instrument(skip(self, url, token), fields(dest = %dest.display()))]
    pub async fn fetch_to(
        &self,
        url: &str,
        token: Option<&str>,
        expect_status: u16,
        dest: &Path,
    ) -> Result<usize> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status.as_u16() != expect_status {
            bail!("{url} returned HTTP {status}, expected {expect_status}");
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        if body.is_empty() {
            bail!("{url} returned an empty body");
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(dest, &body)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;

        debug!(bytes = body.len(), dest = %dest.display(), "script fetched");
        Ok(body.len())
    }
}
