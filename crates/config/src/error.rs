//! Configuration error types

use poset_types::ValidatorId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Failed to parse JSON (genesis)
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// No genesis validators configured
    #[error("No genesis validators configured: at least one validator required")]
    NoValidators,

    /// Duplicate genesis validator
    #[error("Duplicate genesis validator: {0}")]
    DuplicateValidator(ValidatorId),

    /// Genesis validator without weight
    #[error("Genesis validator {0} has zero weight")]
    ZeroWeight(ValidatorId),

    /// Genesis epoch must be positive
    #[error("Invalid genesis epoch: must be at least 1")]
    InvalidEpoch,

    /// Invalid parents limit
    #[error("Invalid max_parents: must be at least 2, got {0}")]
    InvalidMaxParents(usize),

    /// Invalid gas power window
    #[error("Invalid {window} gas power rules: {reason}")]
    InvalidGasPowerRules {
        /// Window name
        window: &'static str,
        /// What is wrong
        reason: &'static str,
    },

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, compact, json")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
