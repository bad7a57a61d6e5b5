//! Health monitoring for backends.

mod monitor;

pub use monitor::HealthMonitor;
