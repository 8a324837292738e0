//! Guard configuration.
//!
//! A [`GuardConfig`] can be built in code, parsed from YAML, or read from
//! the environment. It carries the settings a guard is constructed with;
//! handlers are always registered in code.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Logger name used when none is configured.
pub const DEFAULT_LOGGER_NAME: &str = "guardcall";

/// Environment variable for [`GuardConfig::logger_name`].
pub const LOGGER_ENV: &str = "GUARDCALL_LOGGER";

/// Environment variable for [`GuardConfig::debug`].
pub const DEBUG_ENV: &str = "GUARDCALL_DEBUG";

/// Construction-time settings for a guard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Name reported with every caught failure.
    pub logger_name: String,
    /// Global debug default for handlers without an override.
    pub debug: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            logger_name: DEFAULT_LOGGER_NAME.to_string(),
            debug: false,
        }
    }
}

impl GuardConfig {
    /// Parses a YAML document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown fields.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Builds a config from `GUARDCALL_LOGGER` and `GUARDCALL_DEBUG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `GUARDCALL_DEBUG` is not a
    /// recognizable boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup(LOGGER_ENV).filter(|n| !n.trim().is_empty()) {
            config.logger_name = name;
        }
        if let Some(raw) = lookup(DEBUG_ENV) {
            config.debug = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                field: DEBUG_ENV.to_string(),
                value: raw.clone(),
                expected: "one of 1/0, true/false, yes/no, on/off".to_string(),
            })?;
        }
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
