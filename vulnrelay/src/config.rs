use std::time::Duration;

use crate::error::ConfigError;
use crate::secret::Secret;

/// Findings backend plus the labels attached to every uploaded report.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// Base API URL, e.g. `https://dojo.example.com/api/v2`
    pub backend_url: String,
    pub token: Secret,
    pub product_name: String,
    pub engagement_name: String,
    pub tags: String,
    /// Existing test to reimport into; omitted from the request when unset.
    pub test_id: Option<String>,
}

impl UploadTarget {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("backend URL", &self.backend_url)?;
        if self.token.is_empty() {
            return Err(ConfigError::Empty("backend token".into()));
        }
        for (field, value) in [
            ("product name", &self.product_name),
            ("engagement name", &self.engagement_name),
            ("tags", &self.tags),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(field.into()));
            }
        }
        Ok(())
    }

    pub fn import_url(&self) -> String {
        format!("{}/import-scan/", self.backend_url.trim_end_matches('/'))
    }
}

/// Network behaviour shared by the script fetcher and the upload client.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// Extra attempts made for uploads that never reached the backend.
    pub upload_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub retry_backoff: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            upload_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl HttpOptions {
    pub fn client(&self) -> Result<reqwest::Client, ConfigError> {
        Ok(reqwest::Client::builder()
            .user_agent(concat!("vulnrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()?)
    }
}

pub(crate) fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(field.to_string()));
    }
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"));
    let has_host = rest.is_some_and(|rest| {
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();
        !host.is_empty()
    });
    if !has_host {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
