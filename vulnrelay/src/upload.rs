use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::artifact::ContentType;
use crate::config::{HttpOptions, UploadTarget};

/// Longest backend response body kept for diagnostics.
const MAX_BODY_CHARS: usize = 4096;

/// Terminal state of one report upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum UploadOutcome {
    Delivered { status: u16 },
    /// The backend answered with an error status. Never retried.
    Rejected { status: u16, body: String },
    /// No response was received (connect error, timeout, reset).
    Unreachable { reason: String, attempts: u32 },
}

impl UploadOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Turn anything other than a delivery into an error.
    pub fn into_result(self) -> Result<u16, UploadError> {
        match self {
            Self::Delivered { status } => Ok(status),
            Self::Rejected { status, body } => Err(UploadError::Rejected { status, body }),
            Self::Unreachable { reason, attempts } => Err(UploadError::Unreachable { reason, attempts }),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("backend rejected report with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("backend unreachable after {attempts} attempt(s): {reason}")]
    Unreachable { reason: String, attempts: u32 },

    #[error("failed to read report {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build multipart body: {0}")]
    Form(#[source] reqwest::Error),

    #[error("invalid upload request: {0}")]
    Request(#[source] reqwest::Error),
}

/// A report ready to be submitted.
#[derive(Debug, Clone)]
pub struct ReportUpload<'a> {
    pub path: &'a Path,
    pub file_name: &'a str,
    pub content_type: ContentType,
    pub scan_type: &'a str,
}

/// Client for the findings backend's `import-scan` endpoint.
#[derive(Clone)]
pub struct UploadClient {
    client: reqwest::Client,
    target: Arc<UploadTarget>,
    retries: u32,
    backoff: Duration,
}

impl UploadClient {
    pub fn new(client: reqwest::Client, target: Arc<UploadTarget>, options: &HttpOptions) -> Self {
        Self {
            client,
            target,
            retries: options.upload_retries,
            backoff: options.retry_backoff,
        }
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Upload one report, retrying only while the backend is unreachable.
    #[instrument(skip(self, report), fields(file = report.file_name, scan_type = report.scan_type))]
    pub async fn upload(&self, report: &ReportUpload<'_>) -> Result<UploadOutcome, UploadError> {
        let bytes = tokio::fs::read(report.path)
            .await
            .map_err(|source| UploadError::Read {
                path: report.path.to_path_buf(),
                source,
            })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(attempt, bytes = bytes.len(), "upload in flight");
            let outcome = self.attempt(&bytes, report, attempt).await?;

            match &outcome {
                UploadOutcome::Unreachable { reason, .. } if attempt <= self.retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, error = %reason, delay_ms = delay.as_millis() as u64, "backend unreachable, retrying");
                    tokio::time::sleep(delay).await;
                }
                _ => return Ok(outcome),
            }
        }
    }

    async fn attempt(
        &self,
        bytes: &[u8],
        report: &ReportUpload<'_>,
        attempt: u32,
    ) -> Result<UploadOutcome, UploadError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(report.file_name.to_string())
            .mime_str(report.content_type.mime())
            .map_err(UploadError::Form)?;

        let target = &self.target;
        let mut form = Form::new();
        if let Some(test) = &target.test_id {
            form = form.text("test", test.clone());
        }
        let form = form
            .part("file", part)
            .text("scan_type", report.scan_type.to_string())
            .text("tags", target.tags.clone())
            .text("product_name", target.product_name.clone())
            .text("engagement_name", target.engagement_name.clone());

        let response = self
            .client
            .post(target.import_url())
            .header(AUTHORIZATION, format!("Token {}", target.token.expose()))
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_builder() => return Err(UploadError::Request(e)),
            Err(e) => {
                return Ok(UploadOutcome::Unreachable {
                    reason: e.to_string(),
                    attempts: attempt,
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "report delivered");
            return Ok(UploadOutcome::Delivered {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Ok(UploadOutcome::Rejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_BODY_CHARS).collect(),
        })
    }
}
