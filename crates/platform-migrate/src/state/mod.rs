//! File-based state management for resume capability.

mod backend;
mod noop;

pub use backend::{FileStateBackend, StateBackend};
pub use noop::NoOpStateBackend;

use crate::cache::CacheSnapshot;
use crate::connector::{Exception, Warning};
use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Transfer state for resume capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the transfer started.
    pub started_at: DateTime<Utc>,

    /// Current run status.
    pub status: RunStatus,

    /// Imported batches so far.
    #[serde(default)]
    pub batches: u64,

    /// Cache contents at the time of the checkpoint.
    #[serde(default)]
    pub cache: CacheSnapshot,

    /// Recorded per-resource and per-group failures.
    #[serde(default)]
    pub errors: Vec<Exception>,

    /// Recorded advisory downgrades.
    #[serde(default)]
    pub warnings: Vec<Warning>,

    /// When the transfer finished (if finished).
    pub completed_at: Option<DateTime<Utc>>,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using config_hash as key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(MigrateError::State(format!("Invalid run status: {}", s))),
        }
    }
}

impl TransferState {
    /// Create a new transfer state.
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            status: RunStatus::Running,
            batches: 0,
            cache: CacheSnapshot::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            completed_at: None,
            hmac: None,
        }
    }

    /// Compute HMAC-SHA256 signature for state integrity validation.
    ///
    /// The config hash is the key, so a state file only verifies against the
    /// configuration that produced it.
    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)
            .map_err(|e| {
                MigrateError::State(format!("Failed to serialize state for HMAC: {}", e))
            })?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file with integrity validation.
    ///
    /// Unsigned files are accepted with a warning and signed on next save.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        if let Some(stored_hmac) = &state.hmac {
            let expected_hmac = state.compute_hmac()?;
            if stored_hmac != &expected_hmac {
                return Err(MigrateError::State(
                    "State file integrity check failed: HMAC mismatch (possible tampering)"
                        .to_string(),
                ));
            }
        } else {
            tracing::warn!("State file has no HMAC signature, integrity cannot be verified");
        }

        Ok(state)
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate that the config hash matches for resume.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    /// Mark the transfer as finished with the given status.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}
