//! Configuration loading and management

use crate::core::error::ConfigError;
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_ENDPOINT: &str = "/graphql";
pub const DEFAULT_TRACING_HEADER: &str = "apollo-federation-include-trace";

/// Batch request settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Accept JSON array bodies
    pub enabled: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete configuration for the GraphQL server
///
/// Every member is optional in YAML; missing members take their defaults
/// and unknown members are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path the HTTP exposure mounts GET and POST on
    pub endpoint: String,

    /// Header copied into the execution context when present
    pub tracing_header: String,

    pub batching: BatchingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tracing_header: DEFAULT_TRACING_HEADER.to_string(),
            batching: BatchingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::parse(&content, Some(path.display().to_string()))
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse(yaml, None)
    }

    fn parse(yaml: &str, file: Option<String>) -> Result<Self, ConfigError> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "endpoint".to_string(),
                value: self.endpoint.clone(),
                message: "must start with '/'".to_string(),
            });
        }

        if HeaderName::from_bytes(self.tracing_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "tracing_header".to_string(),
                value: self.tracing_header.clone(),
                message: "not a valid HTTP header name".to_string(),
            });
        }

        Ok(())
    }
}
