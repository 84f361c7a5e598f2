//! Mock compute function upstream for integration testing.
//!
//! Echoes the method, path and body of whatever reaches it and counts hits,
//! so tests can assert whether the gate let a request through.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct MockState {
    hits: AtomicUsize,
    last_headers: RwLock<Option<HeaderMap>>,
}

/// Start the mock function and return its address and handle.
pub async fn start() -> (SocketAddr, MockFunctionHandle) {
    let state = Arc::new(MockState::default());

    let app = Router::new()
        .fallback(handle_invocation)
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (
        addr,
        MockFunctionHandle {
            state,
            _handle: handle,
        },
    )
}

/// Handle to the running mock function.
pub struct MockFunctionHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockFunctionHandle {
    /// Base URL to put in gate configuration.
    pub fn url(addr: SocketAddr) -> String {
        format!("http://{}", addr)
    }

    /// Number of requests that reached the function.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Headers of the most recent request.
    pub async fn last_headers(&self) -> Option<HeaderMap> {
        self.state.last_headers.read().await.clone()
    }
}

async fn handle_invocation(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_headers.write().await = Some(headers);

    (
        StatusCode::OK,
        [("x-function", "resize-image")],
        format!("{} {} {}", method, uri, String::from_utf8_lossy(&body)),
    )
}
