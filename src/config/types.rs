//! Configuration data types.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend pool and selection strategy
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Token-bucket admission policy
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Background health probing
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Forwarding behavior
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// TLS termination settings
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS termination configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Whether to terminate TLS on the listener
    #[serde(default)]
    pub enabled: bool,

    /// PEM certificate chain
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Backend pool configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoadBalancerConfig {
    /// Selection strategy
    #[serde(default)]
    pub strategy: Strategy,

    /// Ordered list of backend base URLs
    #[serde(default)]
    pub backends: Vec<String>,
}

/// Backend selection strategy.
///
/// Unrecognized names fall back to round-robin instead of failing startup,
/// so a typo in the config degrades gracefully.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
    IpHash,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
            Strategy::IpHash => "ip-hash",
        }
    }

    /// Parse a strategy name, accepting both kebab-case and snake_case.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" => Strategy::RoundRobin,
            "least-connections" | "least_connections" => Strategy::LeastConnections,
            "ip-hash" | "ip_hash" => Strategy::IpHash,
            other => {
                if !other.is_empty() {
                    tracing::warn!(
                        strategy = other,
                        "unrecognized strategy, falling back to round-robin"
                    );
                }
                Strategy::RoundRobin
            }
        }
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Strategy::parse_lenient(&name))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token-bucket rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained request rate (tokens refilled per second)
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    /// Burst capacity (bucket size)
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
        }
    }
}

/// Health probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Pause between probe sweeps
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-probe round-trip timeout
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Timeout for a single dispatch attempt (connect through response head)
    #[serde(default = "default_dispatch_timeout", with = "humantime_serde")]
    pub dispatch_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: default_dispatch_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_rate_per_sec() -> f64 {
    1.0
}

fn default_burst() -> u32 {
    5
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(3)
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
