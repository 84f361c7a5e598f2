//! Centralized default values.

/// Session-start endpoint of the broker in the reference deployment.
pub const DEFAULT_BROKER_URL: &str = "http://sentinel:8081/sessions";

/// Gateway listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Admin server port (health, readiness, metrics).
pub const DEFAULT_ADMIN_PORT: u16 = 9090;

/// Seconds to wait for in-flight connections during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Concurrent connections accepted before answering 503.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// TCP keepalive time for accepted sockets.
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;
