//! Request logging.

use hyper::{Method, StatusCode};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Per-request accounting, captured before the request enters the chain and
/// emitted as a single completion line afterwards.
pub struct RequestLog {
    id: Uuid,
    method: Method,
    path: String,
    client_addr: SocketAddr,
    started: Instant,
}

impl RequestLog {
    pub fn start(method: Method, path: impl Into<String>, client_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            client_addr,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Emit the completion line once a response is ready.
    pub fn complete(self, status: StatusCode) {
        info!(
            request_id = %self.id,
            method = %self.method,
            path = %self.path,
            client = %self.client_addr,
            status = status.as_u16(),
            duration_ms = self.started.elapsed().as_millis() as u64,
            "request completed"
        );
    }
}
