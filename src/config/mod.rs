//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the positional `CONFIG_FILE` argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.freecad-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.freecad-mcp\config.json`
//!
//! Unlike an explicit path, a missing default file is not an error: the
//! built-in defaults (FreeCAD on `localhost:9875`, HTTP on `127.0.0.1:8000`)
//! are used instead.
//!
//! # Example Configuration
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{
    normalize_http_path, Config, FreeCadConfig, LoggingConfig, ServerConfig, DEFAULT_FREECAD_PORT,
    DEFAULT_HTTP_PORT, DEFAULT_MESSAGE_PATH, DEFAULT_SSE_PATH, LOG_LEVELS,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable supplying the default HTTP port.
///
/// The launcher sets it on the service to the port it reclaimed. The service
/// reads it for `--port`, so it outranks `server.port` in the config file.
pub const PORT_ENV_VAR: &str = "FREECAD_MCP_PORT";

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.freecad-mcp/`
/// - **Windows:** `%USERPROFILE%\.freecad-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".freecad-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and falls
/// back to [`Config::default`] when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}
