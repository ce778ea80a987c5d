//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::connector::RootScope;
use crate::error::Result;
use crate::resource::ResourceType;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for resume validation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl TransferSettings {
    /// Requested resource types; every type when the list is empty.
    pub fn resource_types(&self) -> Result<Vec<ResourceType>> {
        if self.resources.is_empty() {
            return Ok(ResourceType::ALL.to_vec());
        }
        ResourceType::parse_list(self.resources.as_slice())
    }

    /// Root scope built from `root_id` and `root_type`.
    pub fn root_scope(&self) -> Result<Option<RootScope>> {
        let root_type = self
            .root_type
            .as_deref()
            .map(str::parse::<ResourceType>)
            .transpose()?;
        RootScope::from_parts(self.root_id.clone(), root_type)
    }
}
