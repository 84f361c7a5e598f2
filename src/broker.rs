//! Session broker client.
//!
//! Performs one synchronous `POST` to the broker's session-start endpoint per
//! inbound request and classifies what happened:
//!
//! - HTTP 200 → [`BrokerOutcome::Approved`] (body ignored)
//! - any other status → [`BrokerOutcome::Rejected`] with the full body
//! - transport failure, or failure reading the rejection body →
//!   [`BrokerOutcome::Unreachable`]
//!
//! # Connection Sharing
//!
//! All gates in the process share one lazily built `reqwest` client. It holds
//! no per-call state, so concurrent invocations need no synchronization.
//!
//! # Retries and Timeouts
//!
//! None. A failed call is reported once; retry policy belongs above the gate.
//! Dropping the returned future (caller disconnect) aborts the in-flight call.

use std::error::Error as StdError;
use std::sync::OnceLock;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use reqwest::Client;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::error::GateError;
use crate::session::{SESSION_CONTENT_TYPE, SessionStartRequest};

/// Classified result of one broker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOutcome {
    /// The broker granted or confirmed the session.
    Approved,
    /// The broker answered with a non-success status.
    Rejected {
        /// Status code as received
        status: StatusCode,
        /// Unmodified response payload
        body: Bytes,
    },
    /// No usable response was received.
    Unreachable {
        /// Human-readable failure description
        cause: String,
    },
}

/// Anything that can start a session for the gate.
///
/// Implemented by [`BrokerClient`]; tests substitute in-memory brokers.
#[async_trait]
pub trait SessionBroker: Send + Sync {
    /// Ask the broker to start a session.
    ///
    /// `inbound_headers` are the headers of the request being admitted.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RequestConstruction` only when the outbound call
    /// could not be built. Every failure after that is an `Unreachable`
    /// outcome, not an error.
    async fn start_session(
        &self,
        request: &SessionStartRequest,
        inbound_headers: &HeaderMap,
    ) -> Result<BrokerOutcome, GateError>;
}

static SHARED_HTTP_CLIENT: OnceLock<Result<Client, String>> = OnceLock::new();

/// Process-wide HTTP client for broker calls.
fn shared_http_client() -> Result<Client, GateError> {
    SHARED_HTTP_CLIENT
        .get_or_init(|| {
            Client::builder()
                .tcp_nodelay(true)
                .build()
                .map_err(|e| describe_error(&e))
        })
        .clone()
        .map_err(|reason| GateError::RequestConstruction {
            reason: format!("failed to build broker HTTP client: {}", reason),
        })
}

/// HTTP client for the broker's session-start endpoint.
#[derive(Clone)]
pub struct BrokerClient {
    client: Client,
    url: String,
    allowed_headers: Option<Vec<HeaderName>>,
}

impl BrokerClient {
    /// Create a broker client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RequestConstruction` if the shared HTTP client
    /// cannot be initialized or an allow-listed header name is invalid.
    pub fn new(config: &BrokerConfig) -> Result<Self, GateError> {
        let allowed_headers = match config.forward_headers {
            Some(ref names) => Some(
                names
                    .iter()
                    .map(|name| {
                        HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                            GateError::RequestConstruction {
                                reason: format!("invalid forward header '{}': {}", name, e),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        Ok(Self {
            client: shared_http_client()?,
            url: config.url.clone(),
            allowed_headers,
        })
    }

    /// Build the outbound header set from the inbound one.
    ///
    /// Every value of every forwarded header is copied, then `Content-Type`
    /// is forced to JSON. Headers describing the inbound message framing are
    /// left for the client to set.
    pub fn outbound_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(inbound.len() + 1);

        for (name, value) in inbound {
            if is_framing_header(name) || !self.is_forwarded(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(SESSION_CONTENT_TYPE),
        );
        headers
    }

    fn is_forwarded(&self, name: &HeaderName) -> bool {
        match self.allowed_headers {
            Some(ref allowed) => allowed.contains(name),
            None => true,
        }
    }

    /// Post a session-start request and classify the result.
    pub async fn start_session(
        &self,
        request: &SessionStartRequest,
        inbound_headers: &HeaderMap,
    ) -> Result<BrokerOutcome, GateError> {
        let body = request.encode()?;
        let headers = self.outbound_headers(inbound_headers);

        debug!(
            url = %self.url,
            function_name = %request.function_name,
            duration_seconds = request.duration_seconds,
            forwarded_headers = headers.len(),
            "Posting session start to broker"
        );

        let response = match self
            .client
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Err(GateError::RequestConstruction {
                    reason: describe_error(&e),
                });
            }
            Err(e) => {
                return Ok(BrokerOutcome::Unreachable {
                    cause: describe_error(&e),
                });
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(BrokerOutcome::Approved);
        }

        match response.bytes().await {
            Ok(body) => Ok(BrokerOutcome::Rejected { status, body }),
            Err(e) => Ok(BrokerOutcome::Unreachable {
                cause: describe_error(&e),
            }),
        }
    }
}

#[async_trait]
impl SessionBroker for BrokerClient {
    async fn start_session(
        &self,
        request: &SessionStartRequest,
        inbound_headers: &HeaderMap,
    ) -> Result<BrokerOutcome, GateError> {
        BrokerClient::start_session(self, request, inbound_headers).await
    }
}

/// Headers that describe the inbound message rather than the caller.
fn is_framing_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "content-length"
            | "transfer-encoding"
            | "connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "upgrade"
    )
}

/// Flatten an error and its sources into one line.
fn describe_error(error: &(dyn StdError + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        source = cause.source();
    }
    description
}
