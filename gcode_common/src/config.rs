//! Generic TOML configuration loading shared by the core binary and HAL
//! simulation driver.
//!
//! The machine-specific settings record (feeds, accelerations, homing
//! parameters, ...) lives in [`crate::settings`]; this module only supplies
//! the generic "read a TOML file into a `serde`-deserializable struct, with
//! typed errors" plumbing that both crates build on.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Log level for configuration (replaces `log::Level` so config structs
/// don't need to depend on a particular logging facade's type).
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// Unknown field in TOML (strict parsing with `deny_unknown_fields`).
    #[error("unknown field: {0}")]
    UnknownField(String),
}

/// Common configuration fields shared across binaries in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    pub service_name: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl SharedConfig {
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for any `serde::de::DeserializeOwned` type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`ConfigError::FileNotFound`] if the file is missing,
    /// [`ConfigError::ParseError`] if the TOML is malformed.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        from_toml_str(&content)
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Parse a TOML string, mapping `deny_unknown_fields` rejections to
/// [`ConfigError::UnknownField`] so callers can distinguish a typo from a
/// structurally broken file.
pub fn from_toml_str<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("unknown field") {
            ConfigError::UnknownField(msg)
        } else {
            ConfigError::ParseError(msg)
        }
    })
}
