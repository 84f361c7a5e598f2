//! Configuration for the admission gateway.
//!
//! This module provides:
//! - YAML configuration parsing with unknown-key rejection
//! - Environment variable substitution
//! - Duration literals (`45s`, `5m`, `PT45S`)
//! - Validation of the gate, broker and upstream sections
//! - Environment-driven listener tuning
//!
//! # Example
//!
//! ```ignore
//! use coupe_gate::config::{find_config_file, load_and_validate};
//!
//! let path = find_config_file(None)?;
//! let config = load_and_validate(&path)?;
//! assert_eq!(config.gate.function_name, "resize-image");
//! ```

mod defaults;
mod duration_format;
mod error;
mod loader;
mod schema;
mod server;

pub use defaults::{DEFAULT_ADMIN_PORT, DEFAULT_BROKER_URL, DEFAULT_PORT};
pub use duration_format::parse_duration;
pub use error::ConfigError;
pub use loader::{
    default_config_paths, find_config_file, load_and_validate, load_config, parse_config,
    substitute_env_vars, validate,
};
pub use schema::{BrokerConfig, Config, GateConfig, UpstreamConfig};
pub use server::ServerConfig;
