//! Request-path collaborators wrapped around the forwarder.

mod logging;
mod rate_limit;

pub use logging::RequestLog;
pub use rate_limit::RateLimiter;
