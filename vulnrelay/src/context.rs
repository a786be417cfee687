use std::path::{Path, PathBuf};

use crate::env::Environment;

/// Read-only state shared by all stages of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub workdir: PathBuf,
    pub env: Environment,
}

impl RunContext {
    pub fn new(workdir: impl Into<PathBuf>, env: Environment) -> Self {
        Self {
            workdir: workdir.into(),
            env,
        }
    }

    /// Anchor a relative path at the working directory.
    pub fn path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }
}
