//! Backend registry and selection strategies.

pub mod registry;
pub mod strategy;

pub use registry::{Backend, BackendRegistry, ConnectionGuard};
pub use strategy::{build_strategy, SelectionStrategy};
