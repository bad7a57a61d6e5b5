//! Backend selection strategies.

mod ip_hash;
mod least_conn;
mod round_robin;

pub use ip_hash::IpHash;
pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

use crate::backend::BackendRegistry;
use crate::config::Strategy;
use std::net::SocketAddr;
use std::sync::Arc;

/// Trait for backend selection strategies.
///
/// # Arguments
///
/// * `registry` - The backend registry to select from
/// * `client_addr` - Client's source address (needed for IP hash)
///
/// # Returns
///
/// The index of the selected backend, or `None` when no backend can take
/// the request. An empty registry always yields `None`.
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, registry: &BackendRegistry, client_addr: Option<SocketAddr>)
        -> Option<usize>;
}

/// Build the strategy named in the configuration.
pub fn build_strategy(kind: Strategy) -> Arc<dyn SelectionStrategy> {
    match kind {
        Strategy::RoundRobin => Arc::new(RoundRobin::new()),
        Strategy::LeastConnections => Arc::new(LeastConnections::new()),
        Strategy::IpHash => Arc::new(IpHash::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_strategy_covers_all_kinds() {
        let registry = BackendRegistry::from_urls(&["http://127.0.0.1:9001".to_string()]).unwrap();
        for kind in [
            Strategy::RoundRobin,
            Strategy::LeastConnections,
            Strategy::IpHash,
        ] {
            let strategy = build_strategy(kind);
            assert_eq!(strategy.select(&registry, None), Some(0));
        }
    }
}
