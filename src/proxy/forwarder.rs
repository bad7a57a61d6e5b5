//! Failover-aware request forwarding.
//!
//! Each inbound request is dispatched to the backend chosen by the selection
//! strategy. A transport failure marks that backend down on the spot and the
//! request moves to the next candidate, up to one attempt per configured
//! backend.

use crate::backend::{BackendRegistry, ConnectionGuard, SelectionStrategy};
use crate::proxy::error::ProxyError;
use crate::proxy::upstream::{UpstreamConnection, UpstreamError};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, Incoming, SizeHint};
use hyper::header::HeaderValue;
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Response header announcing the proxy.
pub const PROXY_HEADER: &str = "x-reverse-proxy";

/// Value of [`PROXY_HEADER`].
pub const PROXY_NAME: &str = "revproxy";

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Forwards inbound requests to backends, retrying across the pool on
/// transport failures.
pub struct Forwarder {
    registry: Arc<BackendRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
    dispatch_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        registry: Arc<BackendRegistry>,
        strategy: Arc<dyn SelectionStrategy>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            strategy,
            dispatch_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Handle one inbound request end to end.
    ///
    /// Never fails from the caller's point of view: selector exhaustion and
    /// terminal dispatch failure become 503 responses, everything else is
    /// the backend's own response streamed through.
    pub async fn handle<B>(
        &self,
        req: Request<B>,
        client_addr: SocketAddr,
    ) -> Response<BoxBody<Bytes, hyper::Error>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: std::fmt::Display,
    {
        // Buffer the inbound body up front so a failed dispatch can be
        // retried against another backend with the same bytes.
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(client = %client_addr, error = %e, "failed to read request body");
                return error_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        match self.try_forward(&parts, body, client_addr).await {
            Ok(response) => response,
            Err(err @ (ProxyError::NoHealthyBackend | ProxyError::AllBackendsExhausted)) => {
                warn!(client = %client_addr, error = %err, "request not served");
                error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string())
            }
            Err(err) => {
                warn!(client = %client_addr, error = %err, "request failed");
                error_response(StatusCode::BAD_GATEWAY, &err.to_string())
            }
        }
    }

    async fn try_forward(
        &self,
        parts: &Parts,
        body: Bytes,
        client_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError> {
        if self.registry.is_empty() {
            return Err(ProxyError::NoHealthyBackend);
        }

        // One attempt per configured backend, across all retries.
        let mut attempts = self.registry.len();
        while attempts > 0 {
            attempts -= 1;

            let index = self
                .strategy
                .select(&self.registry, Some(client_addr))
                .ok_or(ProxyError::NoHealthyBackend)?;
            let Some(backend) = self.registry.get(index) else {
                continue;
            };

            let guard = ConnectionGuard::acquire(Arc::clone(&self.registry), index);
            debug!(
                backend = %backend.url(),
                attempts_left = attempts,
                "dispatching request"
            );

            match self
                .dispatch(backend.authority(), parts, body.clone(), client_addr)
                .await
            {
                Ok(response) => return Ok(finish_response(response, guard)),
                Err(err) => {
                    // Fail fast: take the backend out of rotation now rather
                    // than waiting for the next probe sweep. The monitor may
                    // flip it back once the backend recovers.
                    if self.registry.set_healthy(index, false) {
                        warn!(
                            backend = %backend.url(),
                            error = %err,
                            "backend marked unhealthy after transport failure"
                        );
                    } else {
                        debug!(backend = %backend.url(), error = %err, "dispatch failed");
                    }
                    drop(guard);
                }
            }
        }

        Err(ProxyError::AllBackendsExhausted)
    }

    /// One dispatch attempt, bounded by the dispatch timeout from connect
    /// through response head. Body streaming afterwards is unbounded.
    async fn dispatch(
        &self,
        authority: &str,
        parts: &Parts,
        body: Bytes,
        client_addr: SocketAddr,
    ) -> Result<Response<Incoming>, ProxyError> {
        let outbound = build_outbound(parts, body, client_addr);

        let exchange = async {
            let conn = UpstreamConnection::connect(authority).await?;
            conn.send(outbound).await
        };

        match timeout(self.dispatch_timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(UpstreamError::Connect(source))) => Err(ProxyError::Connect {
                backend: authority.to_string(),
                source,
            }),
            Ok(Err(UpstreamError::Http(source))) => Err(ProxyError::Http {
                backend: authority.to_string(),
                source,
            }),
            Err(_) => Err(ProxyError::Timeout {
                backend: authority.to_string(),
            }),
        }
    }
}

/// Copy method, path+query, and headers onto an outbound request, appending
/// the client to `x-forwarded-for`.
fn build_outbound(parts: &Parts, body: Bytes, client_addr: SocketAddr) -> Request<Full<Bytes>> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut req = Request::new(Full::new(body));
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = path_and_query
        .parse()
        .unwrap_or_else(|_| Uri::from_static("/"));
    // Host is kept as sent by the client, for virtual hosting
    *req.headers_mut() = parts.headers.clone();

    let client_ip = client_addr.ip().to_string();
    let forwarded_for = match req
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        req.headers_mut().insert(X_FORWARDED_FOR, value);
    }

    req
}

/// Stamp the proxy header on a backend response and tie the connection
/// guard to the response body.
fn finish_response(
    response: Response<Incoming>,
    guard: ConnectionGuard,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let (mut parts, body) = response.into_parts();
    parts
        .headers
        .insert(PROXY_HEADER, HeaderValue::from_static(PROXY_NAME));

    let body = GuardedBody {
        inner: body.boxed(),
        _guard: guard,
    }
    .boxed();

    Response::from_parts(parts, body)
}

/// Build a plain-text error response.
pub(crate) fn error_response(
    status: StatusCode,
    message: &str,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let body = Full::new(Bytes::from(format!("{message}\n")))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(body)
        .unwrap()
}

pin_project_lite::pin_project! {
    /// Holds the backend's connection count until the response body has been
    /// fully streamed to the client (or dropped).
    struct GuardedBody {
        #[pin]
        inner: BoxBody<Bytes, hyper::Error>,
        _guard: ConnectionGuard,
    }
}

impl Body for GuardedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        self.project().inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
