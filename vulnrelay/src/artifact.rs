use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Xml,
    Text,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Text => "text/plain",
        }
    }

    /// Only scan reports can be sent to the findings backend.
    pub fn is_report(self) -> bool {
        matches!(self, Self::Json | Self::Xml)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Text => "text",
        })
    }
}

/// A file handed from one stage to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub content_type: ContentType,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, content_type: ContentType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            content_type,
        }
    }

    /// The artifact's location, with relative paths anchored at `workdir`.
    pub fn resolve(&self, workdir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workdir.join(&self.path)
        }
    }

    /// True when the artifact exists as a regular file with at least one byte.
    pub async fn is_present(&self, workdir: &Path) -> bool {
        match tokio::fs::metadata(self.resolve(workdir)).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}
