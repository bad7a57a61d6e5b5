//! IP-hash selection.

use super::SelectionStrategy;
use crate::backend::BackendRegistry;
use std::net::SocketAddr;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// IP-hash selection for session affinity.
///
/// The client's IP is hashed with 32-bit FNV-1a and mapped onto the backend
/// list, so a given client always lands on the same backend. The mapping is
/// unconditional (health is not consulted); failover for a dead sticky
/// backend comes from the forwarder's retry loop.
pub struct IpHash;

impl IpHash {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IpHash {
    fn default() -> Self {
        Self::new()
    }
}

/// 32-bit FNV-1a.
fn fnv1a(key: &str) -> u32 {
    key.bytes()
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Reduce a raw `ip:port` source address to the IP alone. Anything that does
/// not parse as a socket address is hashed whole.
fn client_key(raw: &str) -> String {
    raw.parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

impl SelectionStrategy for IpHash {
    fn select(
        &self,
        registry: &BackendRegistry,
        client_addr: Option<SocketAddr>,
    ) -> Option<usize> {
        if registry.is_empty() {
            return None;
        }

        let raw = client_addr.map(|addr| addr.to_string()).unwrap_or_default();
        let key = client_key(&raw);
        Some(fnv1a(&key) as usize % registry.len())
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
    fn test_fnv1a_known_values() {
        // Offset basis for the empty string, plus a fixed vector
        assert_eq!(fnv1a(""), 0x811c_9dc5);
        assert_eq!(fnv1a("10.0.0.1"), 0xdebe_be8d);
        assert_eq!(fnv1a("192.168.1.100"), 0x1ffd_c124);
    }

    #[test]
    fn test_client_key_strips_port() {
        assert_eq!(client_key("10.1.2.3:5555"), "10.1.2.3");
        assert_eq!(client_key("[::1]:8080"), "::1");
    }

    #[test]
    fn test_client_key_falls_back_to_raw() {
        assert_eq!(client_key("not-an-address"), "not-an-address");
        assert_eq!(client_key(""), "");
    }

    #[test]
    fn test_same_client_same_backend() {
        let ih = IpHash::new();
        let registry = test_registry(3);
        let client: SocketAddr = "192.168.1.100:12345".parse().unwrap();

        let first = ih.select(&registry, Some(client)).unwrap();
        for _ in 0..10 {
            assert_eq!(ih.select(&registry, Some(client)), Some(first));
        }
    }

    #[test]
    fn test_port_does_not_affect_mapping() {
        let ih = IpHash::new();
        let registry = test_registry(3);

        let a: SocketAddr = "192.168.1.100:1111".parse().unwrap();
        let b: SocketAddr = "192.168.1.100:2222".parse().unwrap();
        assert_eq!(ih.select(&registry, Some(a)), ih.select(&registry, Some(b)));
    }

    #[test]
    fn test_known_mapping() {
        let ih = IpHash::new();
        let registry = test_registry(3);

        // fnv1a("192.168.1.100") == 0x1ffdc124, and 0x1ffdc124 % 3 == 0
        let client: SocketAddr = "192.168.1.100:9999".parse().unwrap();
        assert_eq!(ih.select(&registry, Some(client)), Some(0));

        // fnv1a("10.0.0.1") == 0xdebebe8d, and 0xdebebe8d % 3 == 2
        let client: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        assert_eq!(ih.select(&registry, Some(client)), Some(2));
    }

    #[test]
    fn test_health_is_not_filtered() {
        let ih = IpHash::new();
        let registry = test_registry(3);
        let client: SocketAddr = "192.168.1.100:9999".parse().unwrap();

        let sticky = ih.select(&registry, Some(client)).unwrap();
        registry.set_healthy(sticky, false);
        assert_eq!(ih.select(&registry, Some(client)), Some(sticky));
    }

    #[test]
    fn test_empty_registry() {
        let ih = IpHash::new();
        let registry = test_registry(0);
        let client: SocketAddr = "192.168.1.100:9999".parse().unwrap();
        assert_eq!(ih.select(&registry, Some(client)), None);
    }
}
