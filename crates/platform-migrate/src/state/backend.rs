//! State backend trait for transfer state storage.
//!
//! The transfer works with `Arc<dyn StateBackend>` without knowing where
//! state lives:
//!
//! - **File**: [`FileStateBackend`], one signed JSON file
//! - **None**: [`NoOpStateBackend`](super::NoOpStateBackend), nothing persisted

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::TransferState;
use crate::error::Result;

/// Trait for transfer state persistence backends.
///
/// Implementations must be `Send + Sync` to allow sharing across async tasks.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Prepare the storage location. Safe to call multiple times.
    async fn init(&self) -> Result<()>;

    /// Persist a checkpoint of the transfer state.
    async fn save(&self, state: &TransferState) -> Result<()>;

    /// Load the latest state for a given config hash.
    ///
    /// Returns `None` if no previous state exists. A stored state produced by
    /// a different configuration is a [`MigrateError::ConfigChanged`](crate::MigrateError::ConfigChanged) error.
    async fn load_latest(&self, config_hash: &str) -> Result<Option<TransferState>>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

/// Stores state in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    async fn save(&self, state: &TransferState) -> Result<()> {
        let mut state = state.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || state.save(path))
            .await
            .map_err(|e| {
                crate::error::MigrateError::State(format!("State save task failed: {}", e))
            })??;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    async fn load_latest(&self, config_hash: &str) -> Result<Option<TransferState>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let state = TransferState::load(&self.path)?;
        state.validate_config(config_hash)?;
        Ok(Some(state))
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
