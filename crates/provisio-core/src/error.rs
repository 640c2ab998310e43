//! Error types for provisio-core

use thiserror::Error;

/// Result type alias using provisio-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Provisio
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Malformed retry policy, breaker parameters or config values
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A config layer is not valid YAML
    #[error("Failed to parse {origin}: {source}")]
    YamlParse {
        origin: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn yaml_parse(origin: impl Into<String>, source: serde_yaml_ng::Error) -> Self {
        Self::YamlParse {
            origin: origin.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Check if this error was raised by parameter validation
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}
