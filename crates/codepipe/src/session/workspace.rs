//! Scratch workspace for submitted source files
//!
//! Each connection owns exactly one file name in the workspace,
//! `code_<connection>.<ext>`, which is overwritten by every run on that
//! connection and removed when the run ends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::config::FileExtension;
use crate::session::ExecutionError;
use crate::types::ConnectionId;

/// Shared scratch directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open the workspace, creating the directory if it does not exist
    ///
    /// The root is resolved to an absolute path, since interpreters are
    /// started with the workspace as their working directory.
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub async fn create(root: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let root = root.as_ref();
        let materialization = |source: std::io::Error| ExecutionError::Materialization {
            path: root.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(root)
            .await
            .map_err(materialization)?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(materialization)?;
        debug!(root = %root.display(), "workspace ready");
        Ok(Self { root })
    }

    /// Get the path to the workspace directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the source file for a connection
    pub fn source_path(&self, connection: &ConnectionId, extension: &FileExtension) -> PathBuf {
        self.root
            .join(format!("code_{}.{}", connection.as_str(), extension))
    }

    /// Write submitted source for a connection, replacing any previous file
    #[instrument(skip(self, source), fields(len = source.len()))]
    pub async fn write(
        &self,
        connection: &ConnectionId,
        extension: &FileExtension,
        source: &[u8],
    ) -> Result<PathBuf, ExecutionError> {
        let path = self.source_path(connection, extension);
        tokio::fs::write(&path, source)
            .await
            .map_err(|source| ExecutionError::Materialization {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "wrote source file");
        Ok(path)
    }

    /// Remove a source file
    ///
    /// Best effort: a missing file is not an error and any other failure is
    /// only logged. Returns whether the file is gone afterwards.
    #[instrument(skip(self))]
    pub async fn remove(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("removed source file");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                warn!(error = %e, "failed to remove source file");
                false
            }
        }
    }
}
