//! Inbound listener and TLS termination.

mod listener;
mod tls;

pub use listener::Listener;
pub use tls::load_tls_acceptor;
