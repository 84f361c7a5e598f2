//! Runtime tuning for the gateway listener.
//!
//! These knobs are process-level rather than per-gate, so they come from the
//! environment instead of the YAML file.

use std::time::Duration;

use super::defaults::{
    DEFAULT_ADMIN_PORT, DEFAULT_MAX_CONNECTIONS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_TCP_KEEPALIVE_SECS,
};

/// Listener and connection settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Enable TCP_NODELAY (Nagle's algorithm disabled)
    pub tcp_nodelay: bool,

    /// TCP keepalive interval in seconds
    pub tcp_keepalive_secs: u64,

    /// Maximum concurrent connections before new ones get 503
    pub max_connections: usize,

    /// How long shutdown waits for in-flight connections
    pub shutdown_timeout: Duration,

    /// Admin server port (health, readiness, metrics)
    pub admin_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            tcp_keepalive_secs: DEFAULT_TCP_KEEPALIVE_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            admin_port: DEFAULT_ADMIN_PORT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `COUPE_TCP_NODELAY` (default: true)
    /// - `COUPE_TCP_KEEPALIVE_SECS` (default: 60)
    /// - `COUPE_MAX_CONNECTIONS` (default: 10000)
    /// - `COUPE_SHUTDOWN_TIMEOUT_SECS` (default: 30)
    /// - `COUPE_ADMIN_PORT` (default: 9090)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            tcp_nodelay: env_parse("COUPE_TCP_NODELAY").unwrap_or(default.tcp_nodelay),

            tcp_keepalive_secs: env_parse("COUPE_TCP_KEEPALIVE_SECS")
                .unwrap_or(default.tcp_keepalive_secs),

            max_connections: env_parse("COUPE_MAX_CONNECTIONS")
                .unwrap_or(default.max_connections),

            shutdown_timeout: env_parse("COUPE_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.shutdown_timeout),

            admin_port: env_parse("COUPE_ADMIN_PORT").unwrap_or(default.admin_port),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.tcp_keepalive_secs, 60);
        assert_eq!(config.max_connections, 10_000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.admin_port, 9090);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        unsafe {
            std::env::set_var("COUPE_MAX_CONNECTIONS", "500");
            std::env::set_var("COUPE_SHUTDOWN_TIMEOUT_SECS", "5");
            std::env::set_var("COUPE_TCP_NODELAY", "false");
        }

        let config = ServerConfig::from_env();
        assert_eq!(config.max_connections, 500);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(!config.tcp_nodelay);

        unsafe {
            std::env::remove_var("COUPE_MAX_CONNECTIONS");
            std::env::remove_var("COUPE_SHUTDOWN_TIMEOUT_SECS");
            std::env::remove_var("COUPE_TCP_NODELAY");
        }
    }

    #[test]
    #[serial]
    fn test_unparseable_env_falls_back() {
        unsafe {
            std::env::set_var("COUPE_ADMIN_PORT", "not-a-port");
        }

        let config = ServerConfig::from_env();
        assert_eq!(config.admin_port, 9090);

        unsafe {
            std::env::remove_var("COUPE_ADMIN_PORT");
        }
    }
}
