#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::handlers::build_handler;
use server::telemetry::init_telemetry;
use tokio::signal;
use zjob::Pool;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let handler = build_handler(config.handler);
    let pool = Pool::new(config.pool.clone(), handler)?;
    log_startup_info(&pool, &config);

    shutdown_signal().await;

    // Teardown joins every pool thread; keep it off the runtime thread.
    tokio::task::spawn_blocking(move || pool.shutdown()).await??;

    tracing::info!("Broker shut down successfully");
    Ok(())
}

fn log_startup_info(pool: &Pool, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting broker on {} with full config: {:#?}",
            pool.frontend_endpoint(),
            config
        );
    } else {
        tracing::info!(
            "Starting broker on {} with {} workers running the {:?} handler",
            pool.frontend_endpoint(),
            pool.workers_count(),
            config.handler
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
