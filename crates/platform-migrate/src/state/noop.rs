//! No-op state backend for transfers without resume capability.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::error::Result;
use crate::state::backend::StateBackend;
use crate::state::TransferState;

/// State backend that doesn't persist state. Logs a warning on first use.
pub struct NoOpStateBackend {
    warned: AtomicBool,
}

impl NoOpStateBackend {
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "Using no-op state backend: transfer state will not be persisted. \
                 An interrupted transfer cannot be resumed."
            );
        }
    }
}

impl Default for NoOpStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for NoOpStateBackend {
    async fn init(&self) -> Result<()> {
        self.warn_once();
        Ok(())
    }

    async fn save(&self, _state: &TransferState) -> Result<()> {
        Ok(())
    }

    async fn load_latest(&self, _config_hash: &str) -> Result<Option<TransferState>> {
        Ok(None)
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}
