//! Error types for the upstream leg of the gateway.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use thiserror::Error;

/// Errors that can occur while forwarding an admitted request to the function.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid URI or target
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Connection error to upstream (maps to 502 Bad Gateway)
    #[error("Connection error: {0}")]
    Connection(String),
}

impl ProxyError {
    /// Status code reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Connection(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidUri(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Convert error to HTTP response with appropriate status code.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let message = match self {
            ProxyError::Connection(_) => {
                "502 Bad Gateway\n\nFailed to connect to function upstream."
            }
            ProxyError::InvalidUri(_) => "400 Bad Request\n\nInvalid request URI.",
        };

        Response::builder()
            .status(self.status())
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from(message)))
            .unwrap_or_else(|_| {
                let mut resp = Response::new(Full::new(Bytes::from("500 Internal Server Error")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            })
    }
}

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
