//! Error handling for the admission gate.
//!
//! Every request-time failure is a [`GateError`]. The same value feeds both
//! channels the host observes: [`GateError::to_response`] renders what the
//! original caller sees, and its `Display` is what the host logs.
//!
//! ## Module Organization
//!
//! - `proxy` - errors from the upstream (function) leg of the pipeline
//! - `GateError` - admission outcomes that terminate a request

pub mod proxy;

pub use proxy::{ProxyError, ProxyResult};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode, header};
use std::convert::Infallible;
use thiserror::Error;

use crate::session::SESSION_CONTENT_TYPE;

/// Errors that terminate an inbound request instead of continuing the pipeline.
#[derive(Debug, Error)]
pub enum GateError {
    /// The broker answered with a non-200 status.
    ///
    /// Not a gate malfunction: status and body are forwarded to the caller
    /// byte-for-byte so they see the broker's own reasoning.
    #[error("{}", String::from_utf8_lossy(.body))]
    Rejected {
        /// Status code reported by the broker
        status: StatusCode,
        /// Unmodified broker response payload
        body: Bytes,
    },

    /// The broker could not be reached, or its rejection body could not be read.
    #[error("{reason}")]
    BrokerUnavailable {
        /// Description of the underlying transport failure
        reason: String,
    },

    /// The outbound session request could not be built.
    #[error("failed to build session request: {reason}")]
    RequestConstruction {
        /// Why construction failed
        reason: String,
    },

    /// The next stage failed after the request was admitted.
    #[error(transparent)]
    Upstream(#[from] ProxyError),
}

impl From<Infallible> for GateError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl GateError {
    /// HTTP status the caller receives for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::BrokerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestConstruction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(e) => e.status(),
        }
    }

    /// Short classification used for metric labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::BrokerUnavailable { .. } => "unreachable",
            Self::RequestConstruction { .. } => "internal_error",
            Self::Upstream(_) => "upstream_error",
        }
    }

    /// Render the terminal response written to the original caller.
    ///
    /// Rejections carry the broker's status and body verbatim with a JSON
    /// content type. Everything else is a plain-text description of the cause.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let builder = Response::builder().status(self.status());

        let built = match self {
            Self::Rejected { body, .. } => builder
                .header(header::CONTENT_TYPE, SESSION_CONTENT_TYPE)
                .body(Full::new(body.clone())),
            Self::Upstream(e) => return e.to_response(),
            _ => builder
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Full::new(Bytes::from(self.to_string()))),
        };

        built.unwrap_or_else(|_| {
            let mut resp = Response::new(Full::new(Bytes::from("500 Internal Server Error")));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
    }
}
