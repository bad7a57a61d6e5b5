//! Proxy error taxonomy.

use thiserror::Error;

/// Errors from the forwarding path.
///
/// Transport-level variants (`Connect`, `Http`, `Timeout`) are handled
/// locally by retrying another backend; only `NoHealthyBackend` and
/// `AllBackendsExhausted` ever reach the client, both as 503 responses.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no healthy backends available")]
    NoHealthyBackend,

    #[error("failed to connect to backend {backend}: {source}")]
    Connect {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to backend {backend} failed: {source}")]
    Http {
        backend: String,
        #[source]
        source: hyper::Error,
    },

    #[error("request to backend {backend} timed out")]
    Timeout { backend: String },

    #[error("all backends failed")]
    AllBackendsExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_facing_messages() {
        // These two strings are the 503 response bodies
        assert_eq!(
            ProxyError::NoHealthyBackend.to_string(),
            "no healthy backends available"
        );
        assert_eq!(
            ProxyError::AllBackendsExhausted.to_string(),
            "all backends failed"
        );
    }

    #[test]
    fn test_timeout_names_backend() {
        let err = ProxyError::Timeout {
            backend: "10.0.0.1:8081".to_string(),
        };
        assert!(err.to_string().contains("10.0.0.1:8081"));
    }
}
