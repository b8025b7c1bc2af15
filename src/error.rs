//! Error types for freecad-mcp configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Log level is not one the server understands.
    #[error("invalid log level '{level}', expected one of: {}", expected.join(", "))]
    InvalidLogLevel {
        /// The rejected level.
        level: String,
        /// Accepted spellings.
        expected: &'static [&'static str],
    },

    /// An SSE or message path cannot be routed.
    #[error("invalid HTTP path '{path}': {reason}")]
    InvalidHttpPath {
        /// The path as configured.
        path: String,
        /// Which rule it breaks.
        reason: &'static str,
    },

    /// The SSE and message paths resolve to the same route.
    #[error("sse_path and message_path must differ (both are '{path}')")]
    ConflictingPaths {
        /// The shared, normalised path.
        path: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: &'static str) -> Self {
        Self::InvalidHttpPath {
            path: path.to_string(),
            reason,
        }
    }
}
