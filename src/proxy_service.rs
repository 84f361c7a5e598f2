//! Reverse proxy to the protected function.
//!
//! This is the stage the admission gate hands approved requests to. The
//! request keeps its method, path, query and end-to-end headers; only the
//! scheme and authority are rewritten to the configured upstream. Bodies are
//! streamed in both directions without buffering.

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Uri};
use http_body::Body;
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error};

use crate::error::{ProxyError, ProxyResult};

/// Boxed error for streamed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for the client's streaming body type.
type ClientBody = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

/// Forwards requests to a fixed upstream base URL.
#[derive(Clone)]
pub struct ProxyService {
    client: Client<HttpConnector, ClientBody>,
    upstream: Uri,
}

impl ProxyService {
    /// Create a proxy for `upstream_url` (e.g. `http://resize-image:8080`).
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidUri` if the URL is not absolute.
    pub fn new(upstream_url: &str) -> ProxyResult<Self> {
        let upstream: Uri = upstream_url
            .parse()
            .map_err(|e| ProxyError::InvalidUri(format!("{}: {}", upstream_url, e)))?;

        if upstream.scheme().is_none() || upstream.authority().is_none() {
            return Err(ProxyError::InvalidUri(format!(
                "upstream URL must be absolute: {}",
                upstream_url
            )));
        }

        let client = Client::builder(TokioExecutor::new())
            .http1_preserve_header_case(true)
            .http2_keep_alive_while_idle(true)
            .build_http::<ClientBody>();

        Ok(Self { client, upstream })
    }

    /// Forward one request and return the upstream's streaming response.
    pub async fn handle_request<B>(&self, req: Request<B>) -> ProxyResult<Response<Incoming>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let target_uri = self.target_uri(req.uri())?;

        debug!(
            method = %req.method(),
            uri = %req.uri(),
            target = %target_uri,
            "Forwarding admitted request"
        );

        let (parts, incoming_body) = req.into_parts();

        let mut upstream_req = Request::builder()
            .method(parts.method)
            .uri(target_uri)
            .version(parts.version);

        if let Some(headers) = upstream_req.headers_mut() {
            copy_end_to_end_headers(&parts.headers, headers);
        }

        let body_stream = BodyStream::new(incoming_body);
        let mapped_stream =
            body_stream.map(|result| result.map_err(|e| -> BoxError { e.into() }));
        let boxed_body: ClientBody = BodyExt::boxed_unsync(StreamBody::new(mapped_stream));

        let upstream_req = upstream_req.body(boxed_body).map_err(|e| {
            error!(error = %e, "Failed to build upstream request");
            ProxyError::InvalidUri(format!("Failed to build request: {}", e))
        })?;

        self.client.request(upstream_req).await.map_err(|e| {
            error!(error = %e, upstream = %self.upstream, "Upstream client error");
            ProxyError::Connection(format!("Client error: {}", e))
        })
    }

    /// Join the upstream base with the inbound path and query.
    fn target_uri(&self, inbound: &Uri) -> ProxyResult<Uri> {
        let base_path = self.upstream.path().trim_end_matches('/');
        let path_and_query = inbound
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let scheme = self.upstream.scheme_str().unwrap_or("http");
        let authority = self
            .upstream
            .authority()
            .map(|a| a.as_str())
            .ok_or_else(|| ProxyError::InvalidUri("upstream URL missing host".to_string()))?;

        format!("{}://{}{}{}", scheme, authority, base_path, path_and_query)
            .parse()
            .map_err(|e| ProxyError::InvalidUri(format!("Failed to parse URI: {}", e)))
    }
}

impl<B> Service<Request<B>> for ProxyService
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Incoming>;
    type Error = ProxyError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.handle_request(req).await })
    }
}

/// Copy every header except hop-by-hop ones and `Host`.
fn copy_end_to_end_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if name == http::header::HOST || is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

/// Check if a header is a hop-by-hop header that shouldn't be forwarded.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}
