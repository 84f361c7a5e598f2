//! Configuration schema types.
//!
//! Unknown keys are rejected at every level so a misspelled directive fails
//! the load instead of being silently ignored.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::DEFAULT_BROKER_URL;
use super::duration_format;
use super::error::ConfigError;

/// Root configuration for one gateway process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The function this gate protects.
    pub gate: GateConfig,

    /// Session broker endpoint.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Where admitted requests are forwarded.
    pub upstream: UpstreamConfig,
}

/// Parameters of the session-start call, fixed for the lifetime of a gate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// Name of the compute function this gate protects.
    pub function_name: String,

    /// How long a session started by this gate should last.
    ///
    /// Zero means "no explicit duration" and is sent as `0`.
    #[serde(deserialize_with = "duration_format::deserialize")]
    pub session_duration: Duration,
}

impl GateConfig {
    /// Build a validated gate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyFunctionName` if `function_name` is blank.
    pub fn new(
        function_name: impl Into<String>,
        session_duration: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            function_name: function_name.into(),
            session_duration,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a gate configuration from a duration literal such as `45s`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidDuration` for malformed or negative
    /// literals, and `ConfigError::EmptyFunctionName` for a blank name.
    pub fn parse(
        function_name: impl Into<String>,
        session_duration: &str,
    ) -> Result<Self, ConfigError> {
        let duration = duration_format::parse_duration(session_duration).map_err(|message| {
            ConfigError::InvalidDuration {
                value: session_duration.to_string(),
                message,
            }
        })?;
        Self::new(function_name, duration)
    }

    /// Check the invariants the deserializer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.function_name.trim().is_empty() {
            return Err(ConfigError::EmptyFunctionName);
        }
        Ok(())
    }
}

/// Session broker endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Full URL of the session-start endpoint.
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Optional allow-list of inbound header names copied to the broker call.
    ///
    /// When absent every inbound header is forwarded.
    #[serde(default)]
    pub forward_headers: Option<Vec<String>>,
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            forward_headers: None,
        }
    }
}

impl BrokerConfig {
    /// Create a broker config pointing at `url`, forwarding all headers.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            forward_headers: None,
        }
    }
}

/// Function upstream settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the function, e.g. `http://resize-image:8080`.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_config_parse() {
        let config = GateConfig::parse("resize-image", "45s").unwrap();
        assert_eq!(config.function_name, "resize-image");
        assert_eq!(config.session_duration, Duration::from_secs(45));
    }

    #[test]
    fn test_gate_config_rejects_blank_name() {
        assert!(matches!(
            GateConfig::new("  ", Duration::from_secs(1)),
            Err(ConfigError::EmptyFunctionName)
        ));
    }

    #[test]
    fn test_gate_config_rejects_negative_duration() {
        let err = GateConfig::parse("resize-image", "-30s").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn test_gate_config_rejects_unknown_directive() {
        let yaml = "function_name: resize-image\nsession_duration: 45s\nretries: 3\n";
        let result: Result<GateConfig, _> = serde_saphyr::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_gate_config_requires_duration() {
        let yaml = "function_name: resize-image\n";
        let result: Result<GateConfig, _> = serde_saphyr::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_broker_defaults() {
        let broker = BrokerConfig::default();
        assert_eq!(broker.url, "http://sentinel:8081/sessions");
        assert!(broker.forward_headers.is_none());
    }
}
