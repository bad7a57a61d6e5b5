//! Round-robin selection.

use super::SelectionStrategy;
use crate::backend::BackendRegistry;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selection with health filtering.
///
/// A single atomic cursor is shared across all concurrent callers, so
/// consecutive selections are spread evenly over healthy backends no matter
/// how requests interleave. Unhealthy backends are skipped; once every
/// candidate has been checked without a healthy match, selection fails.
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select(
        &self,
        registry: &BackendRegistry,
        _client_addr: Option<SocketAddr>,
    ) -> Option<usize> {
        let total = registry.len();
        if total == 0 {
            return None;
        }

        for _ in 0..total {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % total;
            if registry.is_healthy(index) {
                return Some(index);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry(n: usize) -> BackendRegistry {
        let urls: Vec<String> = (0..n)
            .map(|i| format!("http://127.0.0.1:{}", 9001 + i))
            .collect();
        BackendRegistry::from_urls(&urls).unwrap()
    }

    #[test]
    fn test_cycles_in_order() {
        let rr = RoundRobin::new();
        let registry = test_registry(3);

        // Three backends: four selections wrap back to the first
        assert_eq!(rr.select(&registry, None), Some(0));
        assert_eq!(rr.select(&registry, None), Some(1));
        assert_eq!(rr.select(&registry, None), Some(2));
        assert_eq!(rr.select(&registry, None), Some(0));
    }

    #[test]
    fn test_consecutive_selections_form_permutation() {
        let rr = RoundRobin::new();
        let registry = test_registry(5);

        let mut seen: Vec<usize> = (0..5)
            .map(|_| rr.select(&registry, None).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_skips_unhealthy() {
        let rr = RoundRobin::new();
        let registry = test_registry(3);
        registry.set_healthy(1, false);

        for _ in 0..10 {
            let index = rr.select(&registry, None).unwrap();
            assert_ne!(index, 1);
        }
    }

    #[test]
    fn test_all_unhealthy_is_unavailable() {
        let rr = RoundRobin::new();
        let registry = test_registry(3);
        for i in 0..3 {
            registry.set_healthy(i, false);
        }

        assert_eq!(rr.select(&registry, None), None);
    }

    #[test]
    fn test_empty_registry() {
        let rr = RoundRobin::new();
        let registry = test_registry(0);
        assert_eq!(rr.select(&registry, None), None);
    }

    #[test]
    fn test_recovered_backend_rejoins_rotation() {
        let rr = RoundRobin::new();
        let registry = test_registry(2);

        registry.set_healthy(0, false);
        assert_eq!(rr.select(&registry, None), Some(1));

        registry.set_healthy(0, true);
        let selections: Vec<usize> = (0..4).map(|_| rr.select(&registry, None).unwrap()).collect();
        assert!(selections.contains(&0));
        assert!(selections.contains(&1));
    }
}
