use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use storeguard::config::StoreguardConfig;
use storeguard::grpc::GrpcServer;
use storeguard::promo::{PromoCatalog, PromoStore, RedemptionLog};
use storeguard::ratelimit::{spawn_sweeper, RateLimiter};
use storeguard::telemetry::init_tracing;

/// Login throttling and promo code service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = StoreguardConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.grpc_addr {
        config.server.grpc_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Storeguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        grpc_addr = %config.server.grpc_addr,
        max_attempts = config.login.max_attempts,
        window_secs = config.login.window_secs,
        "Configuration loaded"
    );

    // Initialize the login limiter and its expiry sweep
    let rate_limiter = Arc::new(RateLimiter::new());
    let sweeper = spawn_sweeper(rate_limiter.clone(), config.login.sweep_interval());

    // Initialize the promo store
    let mut promos = PromoStore::new().with_history_limit(config.promo.redemption_history_limit);
    if let Some(path) = &config.promo.redemption_log_path {
        info!(path = %path, "Appending redemptions to audit log");
        promos = promos.with_audit_log(RedemptionLog::new(path));
    }
    if let Some(path) = &config.promo.catalog_path {
        let catalog = PromoCatalog::from_file(path)?;
        let loaded = promos.load_catalog(catalog)?;
        info!(path = %path, codes = loaded, "Promo catalog loaded");
    }
    // Usage counts start from the catalog, so replay after seeding
    promos.replay_audit_log()?;

    let grpc_server = GrpcServer::new(
        config.server.grpc_addr,
        rate_limiter,
        config.login.clone(),
        Arc::new(promos),
    );

    let result = grpc_server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.abort();
    result?;

    info!("Storeguard stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
