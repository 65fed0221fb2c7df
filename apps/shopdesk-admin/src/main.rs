//! Shopdesk admin API server.
//!
//! Startup refuses to serve traffic unless the request role is subject to
//! row level security and every tenant table carries a correct policy.

use shopdesk_admin::{app, config::Config, logging, state::AppState};
use shopdesk_api::{spawn_rate_guard_cleanup, IdempotencyCache, RateGuard};
use shopdesk_db::models::spawn_idempotency_sweeper;
use shopdesk_db::{ensure_rls_enforced_role, spawn_policy_auditor, verify_policy_coverage, DbPool};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: Configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server terminated");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = DbPool::connect_with(&config.database_url, &config.pool_config()).await?;
    info!(max_connections = config.db_max_connections, "Database pool ready");

    // Refuse to start on a role that bypasses RLS or on a drifted schema.
    ensure_rls_enforced_role(&pool).await?;
    verify_policy_coverage(&pool).await?;

    let rate_guard = RateGuard::new(config.rate_guard_config());
    let state = AppState::new(pool.clone(), IdempotencyCache::new(config.idempotency_ttl()));
    let router = app(&config, state, rate_guard.clone())?;

    let background = [
        spawn_policy_auditor(
            pool.clone(),
            Duration::from_secs(config.policy_audit_interval_secs),
        ),
        spawn_idempotency_sweeper(
            pool.clone(),
            Duration::from_secs(config.idempotency_sweep_interval_secs),
        ),
        spawn_rate_guard_cleanup(
            rate_guard,
            Duration::from_secs(config.rate_limit_window_secs),
        ),
    ];

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "Shopdesk admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in background {
        task.abort();
    }
    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
