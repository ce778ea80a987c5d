//! Configuration validation.

use super::{Config, ConnectorConfig};
use crate::error::{MigrateError, Result};
use crate::resource::MAX_CHUNK_SIZE;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connector("source", &config.source)?;
    validate_connector("destination", &config.destination)?;

    // Cannot migrate a project onto itself
    if config.source.endpoint == config.destination.endpoint
        && config.source.project == config.destination.project
    {
        return Err(MigrateError::Config(
            "source and destination cannot be the same project".into(),
        ));
    }

    let transfer = &config.transfer;
    transfer.resource_types()?;
    transfer.root_scope()?;

    if let Some(0) = transfer.batch_size {
        return Err(MigrateError::Config(
            "transfer.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = transfer.read_ahead {
        return Err(MigrateError::Config(
            "transfer.read_ahead must be at least 1".into(),
        ));
    }
    if let Some(0) = transfer.checkpoint_every {
        return Err(MigrateError::Config(
            "transfer.checkpoint_every must be at least 1".into(),
        ));
    }
    match transfer.chunk_size {
        Some(0) => {
            return Err(MigrateError::Config(
                "transfer.chunk_size must be at least 1".into(),
            ))
        }
        Some(size) if size > MAX_CHUNK_SIZE => {
            return Err(MigrateError::Config(format!(
                "transfer.chunk_size must be at most {} bytes, got {}",
                MAX_CHUNK_SIZE, size
            )))
        }
        _ => {}
    }

    Ok(())
}

fn validate_connector(role: &str, connector: &ConnectorConfig) -> Result<()> {
    if connector.r#type.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}.type is required", role)));
    }
    if connector.endpoint.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}.endpoint is required", role)));
    }
    Ok(())
}
