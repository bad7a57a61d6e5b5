//! TLS termination support.

use anyhow::{anyhow, bail, Context, Result};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Load a PEM certificate chain and private key and build a TLS acceptor
/// for the listener.
pub fn load_tls_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor> {
    let cert_reader = File::open(cert_file)
        .with_context(|| format!("failed to open certificate file '{}'", cert_file.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_reader))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to parse certificate file '{}'", cert_file.display()))?;
    if certs.is_empty() {
        bail!(
            "certificate file '{}' contains no certificates",
            cert_file.display()
        );
    }

    let key_reader = File::open(key_file)
        .with_context(|| format!("failed to open private key file '{}'", key_file.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_reader))
        .with_context(|| format!("failed to parse private key file '{}'", key_file.display()))?
        .ok_or_else(|| anyhow!("private key file '{}' contains no key", key_file.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_cert_file() {
        let key = NamedTempFile::new().unwrap();
        let result = load_tls_acceptor(Path::new("/nonexistent/server.crt"), key.path());
        assert!(result
            .err()
            .unwrap()
            .to_string()
            .contains("failed to open certificate file"));
    }

    #[test]
    fn test_cert_file_without_certificates() {
        let mut cert = NamedTempFile::new().unwrap();
        cert.write_all(b"this is not pem data").unwrap();
        let key = NamedTempFile::new().unwrap();

        let result = load_tls_acceptor(cert.path(), key.path());
        assert!(result
            .err()
            .unwrap()
            .to_string()
            .contains("contains no certificates"));
    }
}
