//! Engine configuration
//!
//! Loaded from YAML, every field optional:
//!
//! ```yaml
//! max_passes: 64
//! overrun: error
//! warn_duplicate_keys: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The file is not valid YAML for [`EngineConfig`]
    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// What the positional filler does when it runs out of slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Fail the pass with [`EngineError::FillerOverrun`](crate::EngineError::FillerOverrun)
    #[default]
    Error,
    /// Drop the extra value silently
    Ignore,
}

/// Tunables for a store and its recomputation passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on passes run by a single `settle` call
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,

    /// Filler overrun handling
    #[serde(default)]
    pub overrun: OverrunPolicy,

    /// Log a warning when siblings share a builder name and key
    #[serde(default = "default_true")]
    pub warn_duplicate_keys: bool,
}

fn default_max_passes() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            overrun: OverrunPolicy::default(),
            warn_duplicate_keys: default_true(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load from `path` if it exists, otherwise use the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::from_yaml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_passes, 64);
        assert_eq!(config.overrun, OverrunPolicy::Error);
        assert!(config.warn_duplicate_keys);
    }

    #[test]
    fn test_partial_yaml() {
        let config = EngineConfig::from_yaml_str("overrun: ignore\nmax_passes: 3\n").unwrap();
        assert_eq!(config.overrun, OverrunPolicy::Ignore);
        assert_eq!(config.max_passes, 3);
        assert!(config.warn_duplicate_keys);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = EngineConfig::from_yaml_str("overrun: sometimes").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("arbor.yml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
