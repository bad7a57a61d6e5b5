//! Upstream HTTP connections.
//!
//! One connection is dialed per dispatch; both the forwarder and the health
//! monitor go through here.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::warn;

/// Errors from a single upstream exchange.
#[derive(Debug, thiserror::Error)]
pub(crate) enum UpstreamError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[source] hyper::Error),
}

/// A freshly dialed HTTP/1.1 connection to a backend.
#[derive(Debug)]
pub(crate) struct UpstreamConnection {
    sender: SendRequest<Full<Bytes>>,
}

impl UpstreamConnection {
    /// Dial the backend (resolving DNS names as needed) and perform the
    /// HTTP/1.1 handshake.
    pub(crate) async fn connect(authority: &str) -> Result<Self, UpstreamError> {
        let stream = TcpStream::connect(authority)
            .await
            .map_err(UpstreamError::Connect)?;
        let _ = stream.set_nodelay(true);

        let io = TokioIo::new(stream);
        let (sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(UpstreamError::Http)?;

        // Drive the connection until the response body is consumed.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(error = %e, "upstream connection error");
            }
        });

        Ok(Self { sender })
    }

    /// Send one request and wait for the response head. The body keeps
    /// streaming over the spawned connection task afterwards.
    pub(crate) async fn send(
        mut self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, UpstreamError> {
        self.sender
            .send_request(req)
            .await
            .map_err(UpstreamError::Http)
    }
}
