//! Inbound HTTP listener.
//!
//! Accepts client connections, optionally terminates TLS, and drives every
//! request through rate limiting and logging into the forwarder.

use crate::config::Config;
use crate::middleware::{RateLimiter, RequestLog};
use crate::proxy::{error_response, Forwarder};
use crate::server::load_tls_acceptor;
use anyhow::{Context as _, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Listener that accepts and serves client connections.
pub struct Listener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    forwarder: Arc<Forwarder>,
    limiter: Arc<RateLimiter>,
}

impl Listener {
    /// Bind the configured port and, when enabled, prepare TLS termination.
    pub async fn bind(
        config: &Config,
        forwarder: Arc<Forwarder>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        let tls = if config.server.tls.enabled {
            let cert_file = config
                .server
                .tls
                .cert_file
                .as_deref()
                .context("TLS enabled but cert_file is not set")?;
            let key_file = config
                .server
                .tls
                .key_file
                .as_deref()
                .context("TLS enabled but key_file is not set")?;
            Some(load_tls_acceptor(cert_file, key_file)?)
        } else {
            None
        };

        info!(
            listen = %listener.local_addr()?,
            tls = tls.is_some(),
            "listener bound"
        );

        Ok(Self {
            listener,
            tls,
            forwarder,
            limiter,
        })
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("listener starting");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, client_addr)) => {
                            self.handle_connection(stream, client_addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break;
                }
            }
        }
    }

    /// Serve one accepted connection on its own task.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let forwarder = Arc::clone(&self.forwarder);
        let limiter = Arc::clone(&self.limiter);
        let tls = self.tls.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let forwarder = Arc::clone(&forwarder);
                let limiter = Arc::clone(&limiter);
                async move {
                    Ok::<_, Infallible>(serve_request(req, client_addr, &forwarder, &limiter).await)
                }
            });

            let served = match tls {
                Some(acceptor) => {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(client = %client_addr, error = %e, "TLS handshake failed");
                            return;
                        }
                    };
                    http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(TokioIo::new(tls_stream), service)
                        .await
                }
                None => {
                    http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                }
            };

            if let Err(e) = served {
                debug!(client = %client_addr, error = %e, "connection closed with error");
            }
        });
    }
}

/// Rate limit, forward, and log a single request.
async fn serve_request<B>(
    req: Request<B>,
    client_addr: SocketAddr,
    forwarder: &Forwarder,
    limiter: &RateLimiter,
) -> Response<BoxBody<Bytes, hyper::Error>>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let log = RequestLog::start(req.method().clone(), req.uri().path(), client_addr);

    let response = if limiter.try_acquire() {
        forwarder.handle(req, client_addr).await
    } else {
        // Rejected before the selector is ever consulted
        error_response(StatusCode::TOO_MANY_REQUESTS, "too many requests")
    };

    log.complete(response.status());
    response
}
