//! Feed configuration
//!
//! The only recognized option is the broker `endpoint`. It can be loaded from
//! YAML and overridden through the `RACEFEED_ENDPOINT` environment variable.
//!
//! ```yaml
//! endpoint: ws://localhost:8080/ws
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FeedError, Result};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Environment variable that overrides the configured endpoint.
pub const ENDPOINT_ENV_VAR: &str = "RACEFEED_ENDPOINT";

/// Configuration for a live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// URL of the STOMP-over-WebSocket endpoint
    pub endpoint: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { endpoint: DEFAULT_ENDPOINT.to_string() }
    }
}

impl FeedConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| FeedError::config(format!("unable to parse YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading feed configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| FeedError::config_file(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Replace the endpoint with `RACEFEED_ENDPOINT` when it is set.
    pub fn with_env_override(self) -> Result<Self> {
        self.with_endpoint_override(std::env::var(ENDPOINT_ENV_VAR).ok())
    }

    fn with_endpoint_override(mut self, endpoint: Option<String>) -> Result<Self> {
        if let Some(endpoint) = endpoint {
            debug!("Endpoint overridden by {}: {}", ENDPOINT_ENV_VAR, endpoint);
            self.endpoint = endpoint;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the endpoint is a non-empty URL with a scheme.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(FeedError::config("endpoint must not be empty"));
        }

        match endpoint.split_once("://") {
            Some((scheme, rest))
                if !scheme.is_empty()
                    && !rest.is_empty()
                    && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) =>
            {
                Ok(())
            }
            _ => Err(FeedError::config(format!("endpoint '{endpoint}' is not a URL"))),
        }
    }
}
