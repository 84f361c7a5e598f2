//! Tower layer for structured request/response logging.
//!
//! Uses `tower_http::trace::TraceLayer` for the middleware plumbing, with
//! custom callbacks for correlation IDs and header redaction.

use http::HeaderMap;
use std::fmt;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Headers that are redacted from logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
    "set-cookie",
];

/// Header carrying the caller's correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Create the logging/tracing layer placed outermost on the gateway stack.
pub fn logging_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    CorrelationMakeSpan,
    OnRequestLogger,
    OnResponseLogger,
    tower_http::trace::DefaultOnBodyChunk,
    tower_http::trace::DefaultOnEos,
    OnFailureLogger,
> {
    TraceLayer::new_for_http()
        .make_span_with(CorrelationMakeSpan)
        .on_request(OnRequestLogger)
        .on_response(OnResponseLogger)
        .on_failure(OnFailureLogger)
}

/// Span creator that attaches a correlation ID to every request span.
///
/// Uses the inbound `x-request-id` when present, otherwise a fresh UUID, so
/// the gate's own log lines and the broker call can be tied back to the
/// caller's request.
#[derive(Clone, Debug)]
pub struct CorrelationMakeSpan;

impl<B> tower_http::trace::MakeSpan<B> for CorrelationMakeSpan {
    fn make_span(&mut self, request: &hyper::Request<B>) -> tracing::Span {
        let request_id = request_id(request.headers());

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
            request_id = %request_id,
        )
    }
}

/// Inbound correlation ID, or a generated one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Clone, Debug)]
pub struct OnRequestLogger;

impl<B> tower_http::trace::OnRequest<B> for OnRequestLogger {
    fn on_request(&mut self, request: &hyper::Request<B>, _span: &tracing::Span) {
        info!(
            method = %request.method(),
            uri = %request.uri(),
            direction = "inbound",
            "Request received"
        );

        // Sanitizing allocates; only pay for it at debug.
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                version = ?request.version(),
                headers = ?sanitize_headers(request.headers()),
                "Request details"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct OnResponseLogger;

impl<B> tower_http::trace::OnResponse<B> for OnResponseLogger {
    fn on_response(
        self,
        response: &hyper::Response<B>,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        info!(
            status = %response.status().as_u16(),
            latency_ms = latency.as_millis(),
            direction = "outbound",
            "Response sent"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                version = ?response.version(),
                headers = ?sanitize_headers(response.headers()),
                "Response details"
            );
        }
    }
}

/// Logs service errors and 5xx responses.
///
/// Broker rejections surface here as service errors too; the gate has
/// already logged their detail.
#[derive(Clone, Debug)]
pub struct OnFailureLogger;

impl tower_http::trace::OnFailure<tower_http::classify::ServerErrorsFailureClass>
    for OnFailureLogger
{
    fn on_failure(
        &mut self,
        failure: tower_http::classify::ServerErrorsFailureClass,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        warn!(
            classification = %failure,
            latency_ms = latency.as_millis(),
            direction = "error",
            "Request failed"
        );
    }
}

// ============================================================================
// Header Redaction
// ============================================================================

/// Zero-allocation wrapper for sanitized headers.
struct SanitizedHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for SanitizedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_HEADERS_TO_LOG: usize = 50;
        const MAX_VALUE_LEN: usize = 1024;

        let mut map = f.debug_map();

        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx >= MAX_HEADERS_TO_LOG {
                map.entry(&"...", &format!("({} more headers)", self.0.len() - idx));
                break;
            }

            let name_str = name.as_str();
            let is_sensitive = SENSITIVE_HEADERS
                .iter()
                .any(|&sensitive| name_str.eq_ignore_ascii_case(sensitive));

            if is_sensitive {
                map.entry(&name_str, &"[REDACTED]");
                continue;
            }

            match value.to_str() {
                Ok(val_str) if val_str.len() <= MAX_VALUE_LEN => {
                    map.entry(&name_str, &val_str);
                }
                Ok(val_str) => {
                    map.entry(
                        &name_str,
                        &format!("{}... ({} bytes)", &val_str[..MAX_VALUE_LEN], val_str.len()),
                    );
                }
                Err(_) => {
                    map.entry(&name_str, &format!("<binary: {} bytes>", value.len()));
                }
            }
        }

        map.finish()
    }
}

#[inline]
fn sanitize_headers(headers: &HeaderMap) -> SanitizedHeaders<'_> {
    SanitizedHeaders(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_sensitive_headers_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("Cookie", HeaderValue::from_static("session=abc"));
        headers.insert("x-request-id", HeaderValue::from_static("req-7"));

        let rendered = format!("{:?}", sanitize_headers(&headers));

        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("session=abc"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("req-7"));
    }

    #[test]
    fn test_long_values_truncated() {
        let mut headers = HeaderMap::new();
        let long = "a".repeat(2000);
        headers.insert("x-long", HeaderValue::from_str(&long).unwrap());

        let rendered = format!("{:?}", sanitize_headers(&headers));
        assert!(rendered.contains("(2000 bytes)"));
    }

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&headers), "req-42");
    }

    #[test]
    fn test_request_id_generated() {
        let id = request_id(&HeaderMap::new());
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
