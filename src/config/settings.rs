//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Port the FreeCAD addon's RPC server listens on by default.
pub const DEFAULT_FREECAD_PORT: u16 = 9875;

/// Port the HTTP+SSE transport binds by default.
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default path clients use to open an SSE stream.
pub const DEFAULT_SSE_PATH: &str = "/sse";

/// Default path clients POST MCP messages to.
pub const DEFAULT_MESSAGE_PATH: &str = "/messages";

/// Accepted log level spellings. `warning` and `critical` are aliases for
/// `warn` and `error`.
pub const LOG_LEVELS: &[&str] = &[
    "trace", "debug", "info", "warn", "warning", "error", "critical",
];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Connection to the FreeCAD addon.
    #[serde(default)]
    pub freecad: FreeCadConfig,

    /// HTTP+SSE transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Respond with text only, never attaching screenshots.
    #[serde(default)]
    pub only_text_feedback: bool,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel {
                level: self.logging.level.clone(),
                expected: LOG_LEVELS,
            });
        }
        self.freecad.validate()?;
        self.server.validate()
    }
}

/// Connection settings for the FreeCAD addon's RPC server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreeCadConfig {
    /// Host the addon listens on.
    #[serde(default = "default_freecad_host")]
    pub host: String,

    /// Port the addon listens on.
    #[serde(default = "default_freecad_port")]
    pub port: u16,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FreeCadConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("freecad.host must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("freecad.port must be non-zero"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::validation(
                "freecad.timeout_secs must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for FreeCadConfig {
    fn default() -> Self {
        Self {
            host: default_freecad_host(),
            port: default_freecad_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_freecad_host() -> String {
    "localhost".to_string()
}

const fn default_freecad_port() -> u16 {
    DEFAULT_FREECAD_PORT
}

const fn default_timeout_secs() -> u64 {
    30
}

/// HTTP+SSE transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_http_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Relative path that clients use to establish SSE connections.
    #[serde(default = "default_sse_path")]
    pub sse_path: String,

    /// Relative path where clients POST MCP messages.
    #[serde(default = "default_message_path")]
    pub message_path: String,
}

impl ServerConfig {
    /// Validates the bind address and that both HTTP paths normalise and differ.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host must not be empty"));
        }
        let sse = normalize_http_path(&self.sse_path)?;
        let message = normalize_http_path(&self.message_path)?;
        if sse == message {
            return Err(ConfigError::ConflictingPaths { path: sse });
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            sse_path: default_sse_path(),
            message_path: default_message_path(),
        }
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_sse_path() -> String {
    DEFAULT_SSE_PATH.to_string()
}

fn default_message_path() -> String {
    DEFAULT_MESSAGE_PATH.to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error; warning and critical also accepted).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Normalises a user-supplied HTTP path into a relative, absolute-rooted path.
///
/// The input is trimmed and must be non-empty, must not carry a scheme or
/// network location, and must not contain a query string or fragment. A
/// leading `/` is added when missing.
///
/// # Errors
///
/// Returns a validation error when any of the rules above is violated.
pub fn normalize_http_path(path: &str) -> Result<String, ConfigError> {
    let stripped = path.trim();
    if stripped.is_empty() {
        return Err(ConfigError::invalid_path(path, "path cannot be empty"));
    }
    if stripped.contains("://") || stripped.starts_with("//") {
        return Err(ConfigError::invalid_path(
            stripped,
            "must be relative, without a scheme or network location",
        ));
    }
    if stripped.contains('?') || stripped.contains('#') {
        return Err(ConfigError::invalid_path(
            stripped,
            "query strings and fragments are not allowed",
        ));
    }
    if stripped.starts_with('/') {
        Ok(stripped.to_string())
    } else {
        Ok(format!("/{stripped}"))
    }
}
