//! Client configuration.
//!
//! Hierarchical configuration using figment:
//! - programmatic defaults
//! - optional YAML file
//! - environment variable overrides (`ROLODEX_*`, highest priority)
//! - validation after extraction

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fields requested from the service for every profile-shaped fetch.
pub const DEFAULT_SELECT_FIELDS: &str =
    "id,displayName,jobTitle,department,mail,officeLocation,city,businessPhones,imAddresses,companyName";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid flush_threshold: {0}. Must be at least 1")]
    InvalidFlushThreshold(usize),

    #[error("Invalid max_chain_depth: {0}. Must be at least 1")]
    InvalidChainDepth(usize),

    #[error("Invalid timeout_secs: {0}. Must be at least 1")]
    InvalidTimeout(u64),

    #[error("select_fields cannot be empty")]
    EmptySelectFields,

    #[error("Failed to extract configuration: {0}")]
    Extraction(String),
}

/// Tunables for a [`DirectoryClient`](crate::client::DirectoryClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory service, without a trailing slash.
    pub base_url: String,

    /// Relative path of the batch endpoint.
    pub batch_endpoint: String,

    /// Queue size that triggers an immediate flush of the batch queue.
    pub flush_threshold: usize,

    /// Debounce window in milliseconds. A flush fires this long after the
    /// last enqueue, unless the threshold trips first.
    pub debounce_ms: u64,

    /// Upper bound on manager-chain ascent.
    pub max_chain_depth: usize,

    /// Per-request timeout for the underlying HTTP client, in seconds.
    pub timeout_secs: u64,

    /// `$select` field list sent on profile-shaped fetches.
    pub select_fields: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://directory.example.com/v1.0".to_string(),
            batch_endpoint: "/$batch".to_string(),
            flush_threshold: 20,
            debounce_ms: 10,
            max_chain_depth: 15,
            timeout_secs: 30,
            select_fields: DEFAULT_SELECT_FIELDS.to_string(),
        }
    }
}

impl DirectoryConfig {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. Environment variables (`ROLODEX_*`)
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("ROLODEX_"))
            .extract()
            .map_err(|e| ConfigError::Extraction(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific YAML file, with environment
    /// variables still taking precedence.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ROLODEX_"))
            .extract()
            .map_err(|e| ConfigError::Extraction(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.flush_threshold == 0 {
            return Err(ConfigError::InvalidFlushThreshold(self.flush_threshold));
        }
        if self.max_chain_depth == 0 {
            return Err(ConfigError::InvalidChainDepth(self.max_chain_depth));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        if self.select_fields.is_empty() {
            return Err(ConfigError::EmptySelectFields);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DirectoryConfig::default();
        assert_eq!(config.flush_threshold, 20);
        assert_eq!(config.max_chain_depth, 15);
        assert_eq!(config.batch_endpoint, "/$batch");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        temp_env::with_vars(
            [
                ("ROLODEX_BASE_URL", Some("https://dir.test.internal")),
                ("ROLODEX_FLUSH_THRESHOLD", Some("5")),
                ("ROLODEX_DEBOUNCE_MS", Some("2")),
            ],
            || {
                let config = DirectoryConfig::load().expect("load with env overrides");
                assert_eq!(config.base_url, "https://dir.test.internal");
                assert_eq!(config.flush_threshold, 5);
                assert_eq!(config.debounce_ms, 2);
                // Untouched fields keep their defaults.
                assert_eq!(config.max_chain_depth, 15);
            },
        );
    }

    #[test]
    fn test_validation_rejects_zero_threshold() {
        let config = DirectoryConfig {
            flush_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFlushThreshold(0))
        ));
    }

    #[test]
    fn test_validation_rejects_empty_base_url() {
        let config = DirectoryConfig {
            base_url: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyBaseUrl)));
    }

    #[test]
    fn test_validation_rejects_zero_chain_depth() {
        let config = DirectoryConfig {
            max_chain_depth: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChainDepth(0))
        ));
    }
}
