//! Shared helpers for gateway integration tests.
//!
//! Note: Some helpers are only used by a subset of the test binaries, so
//! the module is marked `#[allow(dead_code)]`.

#![allow(dead_code)]

pub mod mock_broker;
pub mod mock_function;

use coupe_gate::config::{ServerConfig, parse_config, validate};
use coupe_gate::server::{gateway_service, serve};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running gateway.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl GatewayHandle {
    /// Absolute URL of `path` on the gateway.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Gate configuration YAML for the given broker and upstream.
#[must_use]
pub fn gate_yaml(broker_url: &str, upstream_url: &str, session_duration: &str) -> String {
    format!(
        r#"
gate:
  function_name: resize-image
  session_duration: {session_duration}
broker:
  url: {broker_url}
upstream:
  url: {upstream_url}
"#
    )
}

/// Start a gateway from YAML on an ephemeral port.
pub async fn start_gateway(yaml: &str) -> GatewayHandle {
    let config = parse_config(yaml).unwrap();
    validate(&config).unwrap();

    let service = gateway_service(&config, None).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let serve_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        serve(listener, service, ServerConfig::default(), serve_shutdown, None)
            .await
            .unwrap();
    });

    GatewayHandle {
        addr,
        shutdown,
        _handle: handle,
    }
}

/// An address nothing is listening on.
pub async fn closed_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
