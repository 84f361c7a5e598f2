//! Configuration error types.
//!
//! Every variant is fatal at load time: the gateway never starts serving with
//! an invalid configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Gate validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// `function_name` is empty or whitespace.
    #[error("gate function_name must not be empty")]
    EmptyFunctionName,

    /// Malformed or negative duration literal.
    #[error("invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Endpoint validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid broker or upstream URL.
    #[error("invalid URL '{url}' for '{field}': {message}")]
    InvalidUrl {
        field: String,
        url: String,
        message: String,
    },

    /// Entry in `broker.forward_headers` is not a valid header name.
    #[error("invalid header name '{name}' in broker.forward_headers")]
    InvalidHeaderName { name: String },

    /// Required environment variable not set.
    #[error("environment variable '{var}' not set")]
    MissingEnvVar { var: String },

    // ─────────────────────────────────────────────────────────────────────────
    // I/O and parsing errors
    // ─────────────────────────────────────────────────────────────────────────
    /// YAML parsing error, including unknown keys and missing fields.
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config file not found at any search location.
    #[error("configuration file not found (searched: {searched:?})")]
    ConfigFileNotFound { searched: Vec<PathBuf> },

    /// Empty configuration file.
    #[error("configuration file is empty")]
    EmptyConfigFile,
}
