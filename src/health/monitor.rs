//! Active health monitoring.
//!
//! A single background task keeps the registry's health flags approximately
//! current without sitting on the request path.

use crate::backend::{Backend, BackendRegistry};
use crate::proxy::upstream::UpstreamConnection;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Uri};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

/// Periodic health prober for all registered backends.
pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendRegistry>, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            timeout,
        }
    }

    /// Run until the shutdown channel fires.
    ///
    /// Backends are probed sequentially, so one sweep costs at most
    /// `backend count × probe timeout` of wall clock. A failing probe only
    /// affects that backend's flag; the loop itself never aborts.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval = %humantime::format_duration(self.interval),
            backends = self.registry.len(),
            "health monitor starting"
        );

        loop {
            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Probe every backend once and record the judgments.
    async fn sweep(&self) {
        for (index, backend) in self.registry.backends().iter().enumerate() {
            let healthy = probe(backend, self.timeout).await;

            // Only transitions are observable; steady state stays quiet.
            if self.registry.set_healthy(index, healthy) {
                if healthy {
                    info!(backend = %backend.url(), "backend is up");
                } else {
                    warn!(backend = %backend.url(), "backend is down");
                }
            }
        }
    }
}

/// Probe one backend with a GET to its base address.
///
/// Up means the request completed without a transport error and the status
/// is below 500; a 4xx still counts as alive.
async fn probe(backend: &Backend, probe_timeout: Duration) -> bool {
    let exchange = async {
        let conn = UpstreamConnection::connect(backend.authority()).await?;

        let mut req = Request::new(Full::new(Bytes::new()));
        *req.uri_mut() = backend
            .url()
            .path()
            .parse()
            .unwrap_or_else(|_| Uri::from_static("/"));
        if let Ok(host) = HeaderValue::from_str(backend.authority()) {
            req.headers_mut().insert(HOST, host);
        }

        conn.send(req).await
    };

    match timeout(probe_timeout, exchange).await {
        Ok(Ok(response)) => !response.status().is_server_error(),
        Ok(Err(_)) | Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread;

    fn start_http_server(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        addr
    }

    fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn registry_for(addrs: &[SocketAddr]) -> Arc<BackendRegistry> {
        let urls: Vec<String> = addrs.iter().map(|a| format!("http://{a}")).collect();
        Arc::new(BackendRegistry::from_urls(&urls).unwrap())
    }

    #[tokio::test]
    async fn test_probe_up_on_success() {
        let addr = start_http_server("200 OK");
        let registry = registry_for(&[addr]);

        assert!(probe(&registry.backends()[0], Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_up_on_client_error_status() {
        let addr = start_http_server("404 Not Found");
        let registry = registry_for(&[addr]);

        assert!(probe(&registry.backends()[0], Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_down_on_server_error_status() {
        let addr = start_http_server("503 Service Unavailable");
        let registry = registry_for(&[addr]);

        assert!(!probe(&registry.backends()[0], Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_down_on_connect_refused() {
        let addr = unused_addr();
        let registry = registry_for(&[addr]);

        assert!(!probe(&registry.backends()[0], Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_sweep_flips_flags_both_ways() {
        let up = start_http_server("200 OK");
        let down = unused_addr();
        let registry = registry_for(&[up, down]);

        // Start from the opposite of reality
        registry.set_healthy(0, false);
        registry.set_healthy(1, true);

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Duration::from_secs(10),
            Duration::from_secs(2),
        );
        monitor.sweep().await;

        assert!(registry.is_healthy(0));
        assert!(!registry.is_healthy(1));
    }

    #[tokio::test]
    async fn test_failing_probe_affects_only_that_backend() {
        let up = start_http_server("200 OK");
        let down = unused_addr();
        let registry = registry_for(&[down, up]);

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Duration::from_secs(10),
            Duration::from_secs(2),
        );
        monitor.sweep().await;

        assert!(!registry.is_healthy(0));
        assert!(registry.is_healthy(1));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let registry = registry_for(&[unused_addr()]);
        let monitor = HealthMonitor::new(
            registry,
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
