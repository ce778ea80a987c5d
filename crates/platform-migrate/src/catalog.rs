//! Connector catalog for explicit dependency injection.
//!
//! The [`ConnectorCatalog`] maps connector type names (the `type` field of a
//! [`ConnectorConfig`]) to factories. It is constructed by the embedding
//! application, which registers the platforms it ships, and then turns a
//! [`Config`] into a ready [`Transfer`].
//!
//! ```rust,ignore
//! let mut catalog = ConnectorCatalog::new();
//! catalog.register_source("appwrite", |cfg| Ok(Arc::new(AppwriteSource::connect(cfg)?)));
//! catalog.register_destination("appwrite", |cfg| Ok(Arc::new(AppwriteDestination::connect(cfg)?)));
//!
//! let transfer = catalog.build_transfer(&config)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ConnectorConfig};
use crate::connector::{Destination, Source};
use crate::error::{MigrateError, Result};
use crate::transfer::{Transfer, TransferConfig};

type SourceFactory = Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn Source>> + Send + Sync>;
type DestinationFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn Destination>> + Send + Sync>;

/// Registry of source and destination connectors by type name.
#[derive(Default, Clone)]
pub struct ConnectorCatalog {
    sources: HashMap<String, SourceFactory>,
    destinations: HashMap<String, DestinationFactory>,
}

impl ConnectorCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn Source>> + Send + Sync + 'static,
    {
        self.sources.insert(name.into(), Arc::new(factory));
    }

    pub fn register_destination<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn Destination>> + Send + Sync + 'static,
    {
        self.destinations.insert(name.into(), Arc::new(factory));
    }

    /// Registered source type names, sorted.
    pub fn source_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered destination type names, sorted.
    pub fn destination_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.destinations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the source named by `config.type`.
    pub fn source(&self, config: &ConnectorConfig) -> Result<Arc<dyn Source>> {
        let factory = self.sources.get(&config.r#type).ok_or_else(|| {
            MigrateError::Config(format!(
                "Unknown source type '{}' (available: {})",
                config.r#type,
                self.source_types().join(", ")
            ))
        })?;
        factory(config)
    }

    /// Instantiate the destination named by `config.type`.
    pub fn destination(&self, config: &ConnectorConfig) -> Result<Arc<dyn Destination>> {
        let factory = self.destinations.get(&config.r#type).ok_or_else(|| {
            MigrateError::Config(format!(
                "Unknown destination type '{}' (available: {})",
                config.r#type,
                self.destination_types().join(", ")
            ))
        })?;
        factory(config)
    }

    /// Validate `config` and build a transfer bound to its hash.
    pub fn build_transfer(&self, config: &Config) -> Result<Transfer> {
        config.validate()?;
        let source = self.source(&config.source)?;
        let destination = self.destination(&config.destination)?;
        Ok(Transfer::new(
            source,
            destination,
            TransferConfig::from_settings(&config.transfer),
        )
        .with_config_hash(config.hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        CallRequest, CallResponse, ConnectorError, ResourceCounts, Target,
    };
    use crate::resource::ResourceType;
    use async_trait::async_trait;

    struct Blackhole;

    #[async_trait]
    impl Target for Blackhole {
        fn name(&self) -> &str {
            "blackhole"
        }

        async fn call(
            &self,
            _request: CallRequest,
        ) -> std::result::Result<CallResponse, ConnectorError> {
            Ok(CallResponse::ok(""))
        }
    }

    #[async_trait]
    impl Source for Blackhole {
        async fn report(
            &self,
            _types: &[ResourceType],
        ) -> std::result::Result<ResourceCounts, ConnectorError> {
            Ok(ResourceCounts::new())
        }
    }

    #[async_trait]
    impl Destination for Blackhole {
        async fn report(
            &self,
            _types: &[ResourceType],
        ) -> std::result::Result<ResourceCounts, ConnectorError> {
            Ok(ResourceCounts::new())
        }
    }

    fn catalog() -> ConnectorCatalog {
        let mut catalog = ConnectorCatalog::new();
        catalog.register_source("blackhole", |_| Ok(Arc::new(Blackhole) as Arc<dyn Source>));
        catalog.register_destination("blackhole", |_| {
            Ok(Arc::new(Blackhole) as Arc<dyn Destination>)
        });
        catalog
    }

    fn config(source_type: &str) -> Config {
        Config::from_yaml(&format!(
            r#"
source:
  type: {}
  endpoint: https://a.example.com
destination:
  type: blackhole
  endpoint: https://b.example.com
"#,
            source_type
        ))
        .unwrap()
    }

    #[test]
    fn test_build_transfer() {
        let config = config("blackhole");
        let transfer = catalog().build_transfer(&config).unwrap();
        assert_eq!(transfer.config().batch_size, 100);
        assert!(transfer.run_id().is_none());
    }

    #[test]
    fn test_unknown_source_type() {
        let config = config("ftp");
        let err = catalog().build_transfer(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown source type 'ftp'"));
        assert!(err.to_string().contains("blackhole"));
    }

    #[test]
    fn test_registered_types() {
        let catalog = catalog();
        assert_eq!(catalog.source_types(), vec!["blackhole"]);
        assert_eq!(catalog.destination_types(), vec!["blackhole"]);
    }
}
