//! revproxy - a reverse-proxying HTTP load balancer
//!
//! Usage:
//!     revproxy --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use revproxy::backend::{build_strategy, BackendRegistry};
use revproxy::config::{load_config, Config};
use revproxy::health::HealthMonitor;
use revproxy::middleware::RateLimiter;
use revproxy::proxy::Forwarder;
use revproxy::server::Listener;
use revproxy::util::init_logging;

/// A reverse-proxying HTTP load balancer written in Rust.
#[derive(Parser, Debug)]
#[command(name = "revproxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration (fatal on error, before the listener opens)
    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // Determine log level (CLI overrides config)
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    // Initialize logging
    init_logging(log_level, &config.global.log_format);

    // If --validate flag, just validate and exit
    if cli.validate {
        info!("configuration is valid");
        println!("Configuration is valid.");
        println!("  Port: {}", config.server.port);
        println!("  TLS: {}", config.server.tls.enabled);
        println!("  Strategy: {}", config.load_balancer.strategy);
        println!("  Backends: {}", config.load_balancer.backends.len());
        for backend in &config.load_balancer.backends {
            println!("    - {backend}");
        }
        return Ok(());
    }

    // Log startup information
    info!(
        config_path = %cli.config.display(),
        port = config.server.port,
        tls = config.server.tls.enabled,
        strategy = %config.load_balancer.strategy,
        backends = config.load_balancer.backends.len(),
        "revproxy starting"
    );

    for backend in &config.load_balancer.backends {
        info!(backend = %backend, "configured backend");
    }

    // Run the proxy
    run(config)
}

/// Run the proxy with the given configuration.
fn run(config: Config) -> Result<()> {
    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the proxy.
async fn run_async(config: Config) -> Result<()> {
    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Build the backend registry and request chain
    let registry = Arc::new(
        BackendRegistry::from_urls(&config.load_balancer.backends)
            .context("invalid backend URL")?,
    );
    let strategy = build_strategy(config.load_balancer.strategy);
    let forwarder = Arc::new(Forwarder::new(
        Arc::clone(&registry),
        strategy,
        config.proxy.dispatch_timeout,
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.rate_per_sec,
        config.rate_limit.burst,
    ));

    // Start the health monitor
    let monitor = HealthMonitor::new(
        Arc::clone(&registry),
        config.health_check.interval,
        config.health_check.timeout,
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown_tx.subscribe()));

    // Bind and start the listener
    let listener = Listener::bind(&config, forwarder, limiter).await?;
    let listener_handle = tokio::spawn(listener.run(shutdown_tx.subscribe()));

    info!("revproxy is running");
    info!("press Ctrl+C to stop");

    // Wait for shutdown signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    // Signal the background tasks to shut down
    let _ = shutdown_tx.send(());

    let _ = monitor_handle.await;
    let _ = listener_handle.await;

    info!("revproxy shut down complete");
    Ok(())
}
