//! Mock session broker for integration testing.
//!
//! Answers `POST /sessions` with a preconfigured status and body, and records
//! every call's headers and JSON payload.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// One recorded session-start call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Mock broker builder.
#[derive(Debug, Clone)]
pub struct MockBroker {
    status: StatusCode,
    body: Bytes,
}

#[derive(Debug)]
struct MockState {
    status: StatusCode,
    body: Bytes,
    calls: RwLock<Vec<RecordedCall>>,
}

impl MockBroker {
    /// Broker that approves every session.
    #[must_use]
    pub fn approving() -> Self {
        Self {
            status: StatusCode::OK,
            body: Bytes::from_static(br#"{"session_id":"s-1"}"#),
        }
    }

    /// Broker that answers every call with `status` and `body`.
    #[must_use]
    pub fn responding(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    /// Start the mock broker and return its address and handle.
    pub async fn start(self) -> (SocketAddr, MockBrokerHandle) {
        let state = Arc::new(MockState {
            status: self.status,
            body: self.body,
            calls: RwLock::new(Vec::new()),
        });

        let app = Router::new()
            .route("/sessions", post(handle_session_start))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockBrokerHandle {
                state,
                _handle: handle,
            },
        )
    }
}

/// Handle to the running mock broker.
pub struct MockBrokerHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockBrokerHandle {
    /// Session-start URL to put in gate configuration.
    pub fn sessions_url(addr: SocketAddr) -> String {
        format!("http://{}/sessions", addr)
    }

    /// Number of calls received.
    pub async fn call_count(&self) -> usize {
        self.state.calls.read().await.len()
    }

    /// Most recent call.
    pub async fn last_call(&self) -> Option<RecordedCall> {
        self.state.calls.read().await.last().cloned()
    }
}

async fn handle_session_start(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.calls.write().await.push(RecordedCall { headers, body });

    (state.status, state.body.clone())
}

/// Start a broker that answers 429 but closes before sending the promised body.
pub async fn start_truncating() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 1024];
                while !received.ends_with(b"}") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 429 Too Many Requests\r\nContent-Length: 100\r\n\r\nshort",
                    )
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}
