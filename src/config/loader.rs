//! Configuration file loading.

use crate::config::{validate_config, Config, Strategy};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid environment override {var}: {reason}")]
    EnvOverride { var: String, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Load configuration from a YAML file.
///
/// Environment variables prefixed with `REVPROXY_` take precedence over the
/// file, key by key (`REVPROXY_SERVER_PORT`, `REVPROXY_STRATEGY`,
/// `REVPROXY_BACKENDS` as a comma-separated list, and so on). The merged
/// configuration is validated before it is returned; any error here is fatal
/// and happens before the listener binds.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let mut config: Config = serde_yaml::from_str(&contents)?;

    let vars: HashMap<String, String> = std::env::vars().collect();
    apply_env_overrides(&mut config, &vars)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply per-key environment overrides to an already-parsed configuration.
fn apply_env_overrides(
    config: &mut Config,
    vars: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    if let Some(value) = vars.get("REVPROXY_SERVER_PORT") {
        config.server.port = parse_var("REVPROXY_SERVER_PORT", value)?;
    }
    if let Some(value) = vars.get("REVPROXY_TLS_ENABLED") {
        config.server.tls.enabled = parse_var("REVPROXY_TLS_ENABLED", value)?;
    }
    if let Some(value) = vars.get("REVPROXY_TLS_CERT_FILE") {
        config.server.tls.cert_file = Some(value.into());
    }
    if let Some(value) = vars.get("REVPROXY_TLS_KEY_FILE") {
        config.server.tls.key_file = Some(value.into());
    }
    if let Some(value) = vars.get("REVPROXY_STRATEGY") {
        config.load_balancer.strategy = Strategy::parse_lenient(value);
    }
    if let Some(value) = vars.get("REVPROXY_BACKENDS") {
        config.load_balancer.backends = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(value) = vars.get("REVPROXY_RATE_LIMIT_RATE") {
        config.rate_limit.rate_per_sec = parse_var("REVPROXY_RATE_LIMIT_RATE", value)?;
    }
    if let Some(value) = vars.get("REVPROXY_RATE_LIMIT_BURST") {
        config.rate_limit.burst = parse_var("REVPROXY_RATE_LIMIT_BURST", value)?;
    }
    if let Some(value) = vars.get("REVPROXY_LOG_LEVEL") {
        config.global.log_level = value.clone();
    }
    Ok(())
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::EnvOverride {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
