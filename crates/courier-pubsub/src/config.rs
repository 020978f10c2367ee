//! Subscription layer configuration.

use crate::error::{PubSubError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits and policies for one node's subscription manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Maximum topics a single subscriber may hold
    pub max_topics_per_subscriber: usize,
    /// Maximum encoded size of one replicated binding
    pub max_binding_bytes: usize,
    /// Skip-and-log malformed replicated bindings instead of failing refresh
    pub skip_malformed_bindings: bool,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            max_topics_per_subscriber: 1024,
            max_binding_bytes: 64 * 1024,
            skip_malformed_bindings: true,
        }
    }
}

impl PubSubConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PubSubError::config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PubSubError::config(format!("Failed to read config file: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_topics_per_subscriber == 0 {
            return Err(PubSubError::config(
                "max_topics_per_subscriber must be greater than zero",
            ));
        }
        if self.max_binding_bytes == 0 {
            return Err(PubSubError::config(
                "max_binding_bytes must be greater than zero",
            ));
        }
        Ok(())
    }
}
