//! Backend registry.
//!
//! The registry is the authoritative, fixed-at-startup list of upstream
//! targets plus their mutable health and connection state. The set and order
//! of backends never change for the process lifetime; only the per-backend
//! atomics do.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use url::Url;

/// One upstream target.
///
/// The address is immutable; `healthy` is written by the health monitor (and
/// by the forwarder on transport failures), `active_connections` only by the
/// forwarder around a single request's lifetime. Each field is independently
/// synchronized, so no lock spans different backends.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    authority: String,
    healthy: AtomicBool,
    active_connections: AtomicU32,
}

impl Backend {
    fn new(url: Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let port = url.port_or_known_default().unwrap_or(80);
        Self {
            authority: format!("{host}:{port}"),
            url,
            // Optimistic default: a backend is assumed up until a probe or a
            // failed dispatch says otherwise.
            healthy: AtomicBool::new(true),
            active_connections: AtomicU32::new(0),
        }
    }

    /// Base URL this backend was configured with.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` used to dial the backend.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn connection_count(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Ordered, fixed-size collection of backends.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
}

impl BackendRegistry {
    pub fn new(urls: Vec<Url>) -> Self {
        Self {
            backends: urls.into_iter().map(Backend::new).collect(),
        }
    }

    /// Build a registry from raw base-URL strings (already validated by the
    /// config layer, but parse failures are still surfaced).
    pub fn from_urls(urls: &[String]) -> Result<Self, url::ParseError> {
        let parsed = urls
            .iter()
            .map(|u| Url::parse(u))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed))
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Write a health judgment for one backend.
    ///
    /// Returns `true` when the stored flag actually flipped, so callers log
    /// transitions and stay silent on steady state. Both the periodic prober
    /// and the forwarder's fail-fast path write through here; last writer
    /// wins.
    pub fn set_healthy(&self, index: usize, healthy: bool) -> bool {
        match self.backends.get(index) {
            Some(backend) => backend.healthy.swap(healthy, Ordering::AcqRel) != healthy,
            None => false,
        }
    }

    pub fn is_healthy(&self, index: usize) -> bool {
        self.backends
            .get(index)
            .map(Backend::is_healthy)
            .unwrap_or(false)
    }

    pub fn inc_connections(&self, index: usize) {
        if let Some(backend) = self.backends.get(index) {
            backend.active_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Saturating decrement; the count never goes negative.
    pub fn dec_connections(&self, index: usize) {
        if let Some(backend) = self.backends.get(index) {
            let _ = backend.active_connections.fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |count| count.checked_sub(1),
            );
        }
    }

    pub fn connection_count(&self, index: usize) -> u32 {
        self.backends
            .get(index)
            .map(Backend::connection_count)
            .unwrap_or(0)
    }
}

/// RAII bracket around a forwarded request.
///
/// Increments the backend's connection count on acquisition and decrements
/// it on drop, so the release runs on every exit path, including early
/// returns and panics.
pub struct ConnectionGuard {
    registry: Arc<BackendRegistry>,
    index: usize,
}

impl ConnectionGuard {
    pub fn acquire(registry: Arc<BackendRegistry>, index: usize) -> Self {
        registry.inc_connections(index);
        Self { registry, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.dec_connections(self.index);
    }
}
