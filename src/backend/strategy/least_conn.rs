//! Least-connections selection.

use super::SelectionStrategy;
use crate::backend::BackendRegistry;
use std::net::SocketAddr;

/// Least-connections selection.
///
/// Scans every backend's live connection count and picks the strictly
/// smallest one. Ties go to the lowest registry index, which keeps the
/// choice deterministic. The scan reads per-backend atomics directly; no
/// lock is held across the registry.
///
/// Health is not consulted here: a down backend with the fewest connections
/// can still be picked, and the forwarder's retry loop is what routes
/// around it.
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for LeastConnections {
    fn select(
        &self,
        registry: &BackendRegistry,
        _client_addr: Option<SocketAddr>,
    ) -> Option<usize> {
        let mut selected = None;
        let mut min_connections = u32::MAX;

        for (index, backend) in registry.backends().iter().enumerate() {
            let connections = backend.connection_count();
            if connections < min_connections {
                min_connections = connections;
                selected = Some(index);
            }
        }
        selected
    }
}
