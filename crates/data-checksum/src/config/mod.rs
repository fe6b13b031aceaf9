//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
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
    ///
    /// Concurrency knobs are left out so a job can be resumed with other worker
    /// or pool sizes.
    pub fn hash(&self) -> String {
        let mut canonical = self.clone();
        canonical.checksum.workers = None;
        canonical.checksum.retries = None;
        canonical.source.max_connections = None;
        canonical.target.max_connections = None;

        let yaml = serde_yaml::to_string(&canonical).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  host: src.example
  user: checker
  password: secret
target:
  host: tgt.example
  user: checker
tables:
  pairs:
    - source: shop.orders
"#;

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.r#type, "mysql");
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.source.timeout_secs, 30);
        assert_eq!(config.checksum.get_chunk_size(), 1000);
        assert_eq!(config.checksum.get_retries(), 10);
        assert!(config.tables.pairs[0].target.is_none());
        assert!(config.tracking.is_none());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(MINIMAL).unwrap();
        let b = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(a.hash(), b.hash());

        let mut c = Config::from_yaml(MINIMAL).unwrap();
        c.checksum.chunk_size = Some(500);
        assert_ne!(a.hash(), c.hash());

        let mut d = Config::from_yaml(MINIMAL).unwrap();
        d.checksum.workers = Some(12);
        d.source.max_connections = Some(30);
        assert_eq!(a.hash(), d.hash());
    }

    #[test]
    fn test_auto_tuning_fills_pool_sizes() {
        let config = Config::from_yaml(MINIMAL).unwrap().with_auto_tuning();
        assert!(config.checksum.workers.is_some());
        assert!(config.source.max_connections.unwrap() >= 4);
        assert!(config.target.max_connections.unwrap() >= 4);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/data-checksum.yaml").unwrap_err();
        assert!(matches!(err, crate::error::ChecksumError::Io(_)));
    }
}
