//! Admission gate.
//!
//! Before a request may continue down the pipeline, the gate asks the session
//! broker to start (or confirm) a session for the protected function. The
//! decision is taken exactly once per request and represented as a
//! [`Verdict`]:
//!
//! ```text
//! Start → BuildingRequest → AwaitingBroker → Approved   → Admit
//!                                          → Rejected   → Terminate(Rejected)
//!                                          → Unreachable→ Terminate(BrokerUnavailable)
//! ```
//!
//! [`AdmissionLayer`] wraps any inner service. On `Admit` the untouched
//! request is handed to the inner service; otherwise the inner service is
//! never called and the [`GateError`] is returned to the host, which renders
//! it with [`GateError::to_response`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use http::{HeaderMap, Request};
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerOutcome, SessionBroker};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::metrics::GateMetrics;
use crate::session::SessionStartRequest;

/// The gate's single decision for one request.
#[derive(Debug)]
#[must_use]
pub enum Verdict {
    /// Continue the pipeline with the original request.
    Admit,
    /// Stop here and report the error to the host.
    Terminate(GateError),
}

impl Verdict {
    /// Outcome label used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Verdict::Admit => "approved",
            Verdict::Terminate(e) => e.kind(),
        }
    }
}

/// One gate instance guarding one function.
///
/// Holds only read-only state, so a single `Arc<AdmissionGate>` serves any
/// number of concurrent requests.
pub struct AdmissionGate {
    config: GateConfig,
    broker: Arc<dyn SessionBroker>,
    metrics: Option<Arc<GateMetrics>>,
}

impl AdmissionGate {
    /// Create a gate for `config` backed by `broker`.
    pub fn new(config: GateConfig, broker: Arc<dyn SessionBroker>) -> Self {
        Self {
            config,
            broker,
            metrics: None,
        }
    }

    /// Attach metrics recording.
    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decide whether the request carrying `inbound_headers` may continue.
    pub async fn evaluate(&self, inbound_headers: &HeaderMap) -> Verdict {
        let function_name = self.config.function_name.as_str();

        info!(
            function_name = %function_name,
            session_duration = %humantime::format_duration(self.config.session_duration),
            "Requesting session from broker"
        );

        let request = SessionStartRequest::from_config(&self.config);
        let started = Instant::now();
        let outcome = self.broker.start_session(&request, inbound_headers).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let verdict = match outcome {
            Ok(BrokerOutcome::Approved) => {
                debug!(
                    function_name = %function_name,
                    latency_ms = elapsed_ms,
                    "Session approved"
                );
                Verdict::Admit
            }
            Ok(BrokerOutcome::Rejected { status, body }) => {
                warn!(
                    function_name = %function_name,
                    status_code = status.as_u16(),
                    response_body = %String::from_utf8_lossy(&body),
                    "Session broker rejected request"
                );
                Verdict::Terminate(GateError::Rejected { status, body })
            }
            Ok(BrokerOutcome::Unreachable { cause }) => {
                error!(
                    function_name = %function_name,
                    error = %cause,
                    "Failed to reach session broker"
                );
                Verdict::Terminate(GateError::BrokerUnavailable { reason: cause })
            }
            Err(e) => {
                error!(
                    function_name = %function_name,
                    error = %e,
                    "Failed to build session request"
                );
                Verdict::Terminate(e)
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_broker_duration(function_name, elapsed_ms);
            metrics.record_decision(function_name, verdict.outcome());
        }

        verdict
    }
}

/// Tower layer placing an [`AdmissionGate`] in front of a service.
#[derive(Clone)]
pub struct AdmissionLayer {
    gate: Arc<AdmissionGate>,
}

impl AdmissionLayer {
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    gate: Arc<AdmissionGate>,
}

impl<S, B> Service<Request<B>> for AdmissionService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<GateError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = GateError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = Arc::clone(&self.gate);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let verdict = gate.evaluate(&parts.headers).await;

            match verdict {
                Verdict::Admit => inner
                    .call(Request::from_parts(parts, body))
                    .await
                    .map_err(Into::into),
                Verdict::Terminate(err) => Err(err),
            }
        })
    }
}
