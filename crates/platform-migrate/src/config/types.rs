//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::resource::DEFAULT_CHUNK_SIZE;

/// Default number of resources per page and per emitted batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of batches buffered between export and import.
pub const DEFAULT_READ_AHEAD: usize = 4;

/// Default number of imported batches between state checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;

/// Default retries for transient destination failures.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Default base backoff between retries.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Platform to read from.
    pub source: ConnectorConfig,

    /// Platform to write to.
    pub destination: ConnectorConfig,

    /// Transfer behavior configuration.
    #[serde(default)]
    pub transfer: TransferSettings,
}

/// Connection settings for one platform.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector type, as registered in the connector catalog.
    pub r#type: String,

    /// API endpoint or connection URL.
    pub endpoint: String,

    /// Project, tenant or database name on the platform.
    #[serde(default)]
    pub project: String,

    /// API key or token.
    #[serde(default)]
    pub api_key: String,

    /// Connector-specific options passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("type", &self.r#type)
            .field("endpoint", &self.endpoint)
            .field("project", &self.project)
            .field("api_key", &"[REDACTED]")
            .field("options", &self.options)
            .finish()
    }
}

/// Transfer behavior configuration.
/// Tunables use Option<T> to distinguish "not set" from "explicitly set";
/// the get_* accessors apply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Resource types to transfer. Empty means every type.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Resources per page and per emitted batch (default: 100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Bytes per chunk for files and deployments (default: 5 MiB).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,

    /// Batches buffered between export and import (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ahead: Option<usize>,

    /// Id of the single resource to scope the transfer to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,

    /// Type of the scoped resource; required together with `root_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_type: Option<String>,

    /// Imported batches between state checkpoints (default: 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_every: Option<usize>,

    /// Retries for transient destination failures (default: 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,

    /// Base backoff between retries in milliseconds, doubled per retry (default: 250).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,

    /// Run the pre-flight report before transferring (default: true).
    #[serde(default = "default_true")]
    pub preflight: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            batch_size: None,
            chunk_size: None,
            read_ahead: None,
            root_id: None,
            root_type: None,
            checkpoint_every: None,
            retry_attempts: None,
            retry_backoff_ms: None,
            preflight: true,
        }
    }
}

impl TransferSettings {
    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn get_chunk_size(&self) -> u64 {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn get_read_ahead(&self) -> usize {
        self.read_ahead.unwrap_or(DEFAULT_READ_AHEAD)
    }

    pub fn get_checkpoint_every(&self) -> usize {
        self.checkpoint_every.unwrap_or(DEFAULT_CHECKPOINT_EVERY)
    }

    pub fn get_retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS)
    }

    pub fn get_retry_backoff_ms(&self) -> u64 {
        self.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS)
    }
}

fn default_true() -> bool {
    true
}
