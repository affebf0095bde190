//! Configuration loading and validation.

mod types;
mod validation;

use std::path::Path;

pub use types::{
    AuthMode, Config, EngineKind, ExportConfig, SourceConfig, StorageConfig,
};
pub use validation::validate_config;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.normalize();
        validate_config(&config)?;
        Ok(config)
    }

    fn normalize(&mut self) {
        while self.storage.bucket_root.ends_with('/') {
            self.storage.bucket_root.pop();
        }
    }
}
