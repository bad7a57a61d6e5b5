//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;
use url::Url;

/// Validate the configuration.
///
/// Checks for:
/// - A usable listen port
/// - At least one backend, each a valid http base URL, no duplicates
/// - TLS enabled only with both certificate and key paths
/// - Sane rate limit and timeout values
///
/// All problems are collected and reported together.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push("server.port must be non-zero".to_string());
    }

    if config.server.tls.enabled {
        if config.server.tls.cert_file.is_none() {
            errors.push("server.tls.enabled requires server.tls.cert_file".to_string());
        }
        if config.server.tls.key_file.is_none() {
            errors.push("server.tls.enabled requires server.tls.key_file".to_string());
        }
    }

    if config.load_balancer.backends.is_empty() {
        errors.push("at least one backend must be configured".to_string());
    }

    let mut seen = HashSet::new();
    for raw in &config.load_balancer.backends {
        match Url::parse(raw) {
            Ok(url) => {
                if url.scheme() != "http" {
                    errors.push(format!(
                        "backend '{}' must use the http scheme (TLS to backends is not supported)",
                        raw
                    ));
                }
                if url.host_str().is_none() {
                    errors.push(format!("backend '{}' has no host", raw));
                }
                if !seen.insert(url.to_string()) {
                    errors.push(format!("duplicate backend: {}", raw));
                }
            }
            Err(e) => {
                errors.push(format!("backend '{}' is not a valid URL: {}", raw, e));
            }
        }
    }

    if config.rate_limit.rate_per_sec <= 0.0 {
        errors.push("rate_limit.rate_per_sec must be positive".to_string());
    }
    if config.rate_limit.burst == 0 {
        errors.push("rate_limit.burst must be at least 1".to_string());
    }

    if config.health_check.interval.is_zero() {
        errors.push("health_check.interval must be non-zero".to_string());
    }
    if config.health_check.timeout.is_zero() {
        errors.push("health_check.timeout must be non-zero".to_string());
    }
    if config.proxy.dispatch_timeout.is_zero() {
        errors.push("proxy.dispatch_timeout must be non-zero".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
