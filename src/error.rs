//! Error types for `guardcall`
//!
//! Engine-level errors only. Failures raised by guarded bodies and handlers
//! are never wrapped in these types; they travel as [`crate::Failure`]
//! handles and reach the caller unchanged.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Guard Errors
// ============================================================================

/// Errors raised by the guard engine itself.
///
/// When one of these surfaces from a guarded call it arrives as a
/// [`crate::Failure`] that downcasts back to `GuardError`.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The registry is in a state that cannot be executed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A context accessor was used outside an active invocation.
    #[error("context is only accessible within error handling clauses")]
    Usage,

    /// A context attribute was read or removed but never set.
    #[error("context has no attribute '{name}'")]
    MissingAttribute {
        /// Attribute name that was looked up
        name: String,
    },

    /// A context attribute exists but holds a different type.
    #[error("context attribute '{name}' is not a {expected}")]
    AttributeType {
        /// Attribute name that was looked up
        name: String,
        /// Type name the caller asked for
        expected: &'static str,
    },
}

impl GuardError {
    /// Returns `true` for [`GuardError::Usage`].
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage)
    }

    /// Returns `true` for [`GuardError::Configuration`].
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

// ============================================================================
// Configuration Loading Errors
// ============================================================================

/// Errors while loading a [`crate::config::GuardConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// YAML parsing failed
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field (or environment variable) has an unusable value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field or variable
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, GuardError>;
