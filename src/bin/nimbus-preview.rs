use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use nimbus_preview_core::cache::PreviewCache;
use nimbus_preview_core::config::PreviewConfig;
use nimbus_preview_core::job::JobRunner;
use nimbus_preview_core::logging::{LogCrateSink, init_env_logger};
use nimbus_preview_core::server::{ServerState, router};
use nimbus_preview_core::tools::{ProcessRunner, TempFileManager, ToolPaths};
use tokio::signal;

const STARTUP_CLEANUP_MAX_AGE_HOURS: u64 = 24;
const STALE_STAGING_MAX_AGE_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> ExitCode {
    init_env_logger();

    let config = match PreviewConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = PreviewCache::new(&config.output_root);
    if let Err(e) = cache.ensure_root() {
        log::error!(
            "Cannot create output directory {}: {}",
            cache.root().display(),
            e
        );
        return ExitCode::FAILURE;
    }
    let swept = cache.sweep_stale_staging(Duration::from_secs(STALE_STAGING_MAX_AGE_SECS));
    let swept_temp = TempFileManager::new(&config.temp_root)
        .sweep_older_than(Duration::from_secs(STARTUP_CLEANUP_MAX_AGE_HOURS * 3600));
    if swept + swept_temp > 0 {
        log::info!("Removed {} stale staging and {} temp entries", swept, swept_temp);
    }

    let paths = ToolPaths::discover();
    let runner = JobRunner::new(
        &config,
        cache,
        Arc::new(ProcessRunner::new(paths)),
        Arc::new(LogCrateSink),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(ServerState::new(config, runner));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Cannot bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Preview service listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    log::info!("Server shutdown complete");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", e);
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
                log::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => log::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
