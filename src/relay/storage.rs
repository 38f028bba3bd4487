// Result file persistence
use std::path::{Path, PathBuf};

use super::error::{RelayError, RelayResult};

/// Flat file holding the last released session's raw audio.
#[derive(Debug, Clone)]
pub struct ResultFile {
    path: PathBuf,
}

impl ResultFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents with `bytes`, creating parent directories.
    pub async fn overwrite(&self, bytes: &[u8]) -> RelayResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| self.persist_error(source))?;
        }

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| self.persist_error(source))
    }

    fn persist_error(&self, source: std::io::Error) -> RelayError {
        RelayError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}
