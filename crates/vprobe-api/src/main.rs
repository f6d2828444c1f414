//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vprobe_api::{create_router, metrics, ApiConfig, AppState};
use vprobe_media::{FfmpegToolchain, MediaToolchain};
use vprobe_store::JobStore;
use vprobe_worker::{JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    info!("Starting vprobe-api");

    // Load configuration
    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, upload_dir={}, production={}",
        config.host,
        config.port,
        config.upload_dir.display(),
        config.is_production()
    );

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.upload_dir.display()))?;

    let toolchain = Arc::new(FfmpegToolchain::new(
        worker_config.ffprobe_path.clone(),
        worker_config.ffmpeg_path.clone(),
    ));
    let availability = toolchain.availability();
    if !availability.all_present() {
        warn!(
            ffprobe = ?availability.ffprobe,
            ffmpeg = ?availability.ffmpeg,
            "Media tools missing; jobs will fail until they are installed"
        );
    }

    let executor = Arc::new(JobExecutor::new(
        worker_config.clone(),
        Arc::new(JobStore::new()),
        Arc::clone(&toolchain) as Arc<dyn MediaToolchain>,
    ));
    let sweeper = executor.spawn_retention_sweeper();

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    // Create router
    let state = AppState::new(config.clone(), Arc::clone(&executor), toolchain);
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    executor.shutdown(worker_config.shutdown_timeout).await;
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            error!("Retention sweeper task failed: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["vprobe_api=info", "vprobe_worker=info", "vprobe_media=info", "vprobe_store=info"] {
        env_filter = env_filter.add_directive(directive.parse()?);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
