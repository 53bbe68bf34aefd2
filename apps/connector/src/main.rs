//! # Confluence Connector
//!
//! Long-running process that keeps every configured tenant's Confluence
//! content in sync with Unique.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connector Process                                │
//! │                                                                         │
//! │  tracing init ──► tenant configs ──► registry ──► scheduler.start()     │
//! │                                                        │                │
//! │                                       ctrl_c / SIGTERM ▼                │
//! │                          scheduler.shutdown() ──► drain (30s)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment
//! - `TENANT_CONFIG_PATH_PATTERN` - glob of tenant config files (required)
//! - `RUST_LOG` - log filter, defaults to `info`
//! - `LOG_FORMAT` - `json` or `pretty` (default)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use confluence_sync::{build_registry, get_tenant_configs, TenantSyncScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long in-flight runs get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Confluence connector...");

    // Load tenant configuration
    let configs = get_tenant_configs().context("Failed to load tenant configs")?;
    info!(
        tenants = configs.len(),
        names = ?configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "Tenant configs loaded"
    );

    // Wire clients and services
    let registry = Arc::new(build_registry(&configs).context("Failed to build tenant services")?);

    // Start scheduling
    let scheduler = TenantSyncScheduler::new(registry);
    scheduler
        .start()
        .await
        .context("Failed to start tenant scheduler")?;
    info!("Connector running");

    shutdown_signal().await;

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Failed to stop scheduler cleanly");
    }

    if scheduler.wait_for_idle(DRAIN_TIMEOUT).await {
        info!("All tenant syncs finished");
    } else {
        warn!(
            active_runs = scheduler.active_runs(),
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "Shutdown timeout reached with syncs still running"
        );
    }

    info!("Connector shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.pretty().init(),
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
