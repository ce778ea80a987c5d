//! Error types for the migration library.

use thiserror::Error;

use crate::connector::{ConnectorError, ErrorKind};

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A connector call failed in a way that is not absorbed per resource.
    #[error("Connector {connector} failed: {source}")]
    Connector {
        connector: String,
        #[source]
        source: ConnectorError,
    },

    /// Pre-flight probe was rejected for lack of permission.
    #[error("Connector {connector} is missing permission: {message}")]
    Forbidden { connector: String, message: String },

    /// `Cache::remove` was called for an entry that was never cached.
    #[error("Cache entry not found: {resource_type} sequence {sequence}")]
    CacheMissing {
        resource_type: String,
        sequence: String,
    },

    /// A child resource was built before its parent reached the cache.
    #[error("Parent {parent} of {resource_type} {id} is not cached")]
    MissingParent {
        resource_type: String,
        id: String,
        parent: String,
    },

    /// Only one half of a root scope was supplied.
    #[error("Root scope requires both root id and root type")]
    IncompleteRoot,

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since last run - cannot resume. Start a fresh transfer instead.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The export task ended abnormally.
    #[error("Export task failed: {0}")]
    Pipeline(String),

    /// Transfer was cancelled through its cancellation token.
    #[error("Transfer cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Wrap a connector error, lifting permission failures into [`MigrateError::Forbidden`].
    pub fn connector(connector: impl Into<String>, source: ConnectorError) -> Self {
        let connector = connector.into();
        if source.kind == ErrorKind::Forbidden {
            MigrateError::Forbidden {
                connector,
                message: source.message,
            }
        } else {
            MigrateError::Connector { connector, source }
        }
    }

    /// Whether this error came from a rejected permission probe.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, MigrateError::Forbidden { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::IncompleteRoot | MigrateError::Yaml(_) => 2,
            MigrateError::Forbidden { .. } | MigrateError::Connector { .. } => 3,
            MigrateError::State(_) | MigrateError::ConfigChanged | MigrateError::Json(_) => 4,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_is_lifted() {
        let err = MigrateError::connector("dest", ConnectorError::forbidden("missing scope"));
        assert!(err.is_forbidden());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_other_connector_errors_keep_source() {
        let err = MigrateError::connector("dest", ConnectorError::transient(503, "unavailable"));
        assert!(!err.is_forbidden());
        let detailed = err.format_detailed();
        assert!(detailed.contains("Caused by"));
        assert!(detailed.contains("unavailable"));
    }
}
