//! Gateway listener.
//!
//! Accepts TCP connections, serves HTTP/1.1 and HTTP/2 on each through the
//! gateway service stack, and drains in-flight connections on shutdown:
//!
//! ```text
//! TraceLayer (logging_layer) → AdmissionLayer (gate) → ProxyService (function)
//! ```
//!
//! Any [`GateError`] coming out of the stack is logged here and rendered with
//! [`GateError::to_response`], so the log line and the caller's response are
//! produced from the same value.

use bytes::Bytes;
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, Trace};
use tracing::{debug, error, info, warn};

use crate::broker::BrokerClient;
use crate::config::{Config, ServerConfig};
use crate::error::GateError;
use crate::gate::{AdmissionGate, AdmissionLayer, AdmissionService};
use crate::logging_layer::{
    CorrelationMakeSpan, OnFailureLogger, OnRequestLogger, OnResponseLogger, logging_layer,
};
use crate::metrics::GateMetrics;
use crate::proxy_service::{BoxError, ProxyService};

/// Body type written back to callers.
pub type GatewayBody = UnsyncBoxBody<Bytes, BoxError>;

/// The full per-request service stack.
pub type GatewayService = Trace<
    AdmissionService<ProxyService>,
    SharedClassifier<ServerErrorsAsFailures>,
    CorrelationMakeSpan,
    OnRequestLogger,
    OnResponseLogger,
    DefaultOnBodyChunk,
    DefaultOnEos,
    OnFailureLogger,
>;

/// Grace period for a single connection after shutdown is signalled.
const CONNECTION_GRACE: Duration = Duration::from_secs(5);

/// Build the gateway stack from loaded configuration.
///
/// # Errors
///
/// Fails if the broker client or upstream proxy cannot be constructed.
pub fn gateway_service(
    config: &Config,
    metrics: Option<Arc<GateMetrics>>,
) -> Result<GatewayService, GateError> {
    let broker = Arc::new(BrokerClient::new(&config.broker)?);
    let proxy = ProxyService::new(&config.upstream.url)?;

    let mut gate = AdmissionGate::new(config.gate.clone(), broker);
    if let Some(metrics) = metrics {
        gate = gate.with_metrics(metrics);
    }

    Ok(ServiceBuilder::new()
        .layer(logging_layer())
        .layer(AdmissionLayer::new(Arc::new(gate)))
        .service(proxy))
}

/// Connection tracker for graceful shutdown.
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    active_connections: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

/// Accept connections on `listener` until `shutdown` is cancelled, then
/// drain for up to `config.shutdown_timeout`.
///
/// Accept errors are logged and the loop continues.
pub async fn serve<S, ResB>(
    listener: TcpListener,
    service: S,
    config: ServerConfig,
    shutdown: CancellationToken,
    metrics: Option<Arc<GateMetrics>>,
) -> std::io::Result<()>
where
    S: tower::Service<Request<Incoming>, Response = Response<ResB>, Error = GateError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ResB: Body<Data = Bytes> + Send + 'static,
    ResB::Error: Into<BoxError>,
{
    let tracker = ConnectionTracker::new();
    let semaphore = Arc::new(Semaphore::new(config.max_connections));

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                warn!(
                                    peer = %peer_addr,
                                    max_connections = config.max_connections,
                                    "Rejected connection: max connections reached"
                                );
                                if let Some(ref metrics) = metrics {
                                    metrics.record_connection_rejected();
                                }
                                tokio::spawn(async move {
                                    let _ = send_503_response(stream).await;
                                });
                                continue;
                            }
                        };

                        if let Err(e) = configure_tcp_stream(&stream, &config) {
                            error!(error = %e, "Failed to configure socket");
                        }

                        let service = service.clone();
                        let conn_shutdown = shutdown.clone();
                        let tracker = tracker.clone();

                        tracker.increment();

                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, service, conn_shutdown).await;
                            tracker.decrement();
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }

            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, stopping new connections");
                break;
            }
        }
    }

    drain(&tracker, config.shutdown_timeout).await;
    Ok(())
}

/// Wait for tracked connections to finish, up to `deadline`.
async fn drain(tracker: &ConnectionTracker, deadline: Duration) {
    info!(
        active_connections = tracker.count(),
        timeout_seconds = deadline.as_secs(),
        "Waiting for active connections to drain"
    );

    let start = Instant::now();
    let mut last_report = start;

    while tracker.count() > 0 {
        if start.elapsed() >= deadline {
            warn!(
                active_connections = tracker.count(),
                "Shutdown timeout reached, forcing exit"
            );
            return;
        }

        sleep(Duration::from_millis(100)).await;

        if last_report.elapsed() >= Duration::from_secs(5) {
            last_report = Instant::now();
            info!(
                active_connections = tracker.count(),
                elapsed_seconds = start.elapsed().as_secs(),
                "Still draining connections..."
            );
        }
    }

    info!("All connections drained, shutting down cleanly");
}

/// Serve one connection until it closes or shutdown is signalled.
async fn handle_connection<S, ResB>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: S,
    shutdown: CancellationToken,
) where
    S: tower::Service<Request<Incoming>, Response = Response<ResB>, Error = GateError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ResB: Body<Data = Bytes> + Send + 'static,
    ResB::Error: Into<BoxError>,
{
    debug!(peer = %peer_addr, "Connection accepted");

    let io = TokioIo::new(stream);

    let svc_fn = hyper::service::service_fn(move |req: Request<Incoming>| {
        let svc = service.clone();
        async move {
            let response: Response<GatewayBody> = match svc.oneshot(req).await {
                Ok(response) => response.map(|body| {
                    body.map_err(|e| -> BoxError { e.into() })
                        .boxed_unsync()
                }),
                Err(e) => {
                    error!(
                        error = %e,
                        kind = e.kind(),
                        status = e.status().as_u16(),
                        "Service error"
                    );
                    e.to_response().map(|body| {
                        body.map_err(|never: Infallible| -> BoxError { match never {} })
                            .boxed_unsync()
                    })
                }
            };
            Ok::<_, Infallible>(response)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(io, svc_fn);

    tokio::pin!(conn);

    tokio::select! {
        result = &mut conn => {
            if let Err(e) = result {
                debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        }
        _ = shutdown.cancelled() => {
            debug!(peer = %peer_addr, "Shutdown signal received, gracefully closing connection");
            conn.as_mut().graceful_shutdown();
            let _ = tokio::time::timeout(CONNECTION_GRACE, conn).await;
        }
    }
}

/// Apply socket options to an accepted connection.
fn configure_tcp_stream(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);
    let keepalive =
        socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.tcp_keepalive_secs));
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Send a raw 503 when the connection limit is exhausted.
async fn send_503_response(mut stream: TcpStream) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = "503 Service Unavailable\n\n\
                The gateway has reached its maximum connection limit.\n\
                Please retry your request in a moment.";
    let response = format!(
        "HTTP/1.1 503 Service Unavailable\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Retry-After: 1\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
