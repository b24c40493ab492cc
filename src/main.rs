use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use radar::cli::Cli;
use radar::config;
use radar::dashboard::{self, DashboardContext};
use radar::hub::Hub;
use radar::orchestrator::Orchestrator;
use radar::server::{self, AppState};
use radar::stats::Stats;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Worker threads still running at this deadline after a stop signal are
/// abandoned with a warning rather than awaited further.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let dev_mode = cli.dev;
    let overrides = cli.into_overrides();

    let config = match config::load(&overrides) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("FATAL: failed to load config: {err}");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr,
        "radar starting"
    );

    let log_sink = match radar_ui_log::JsonlLogSink::new(config.logs_dir.clone()) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("FATAL: failed to initialize log sink: {err}");
            std::process::exit(1);
        }
    };

    let hub = Hub::new(Duration::from_millis(config.flush_interval_ms));
    let stats = Arc::new(Stats::default());
    let orchestrator = Arc::new(Orchestrator::new(hub.clone(), stats.clone()));
    let (packet_handler, decode_worker) = orchestrator.packet_handler();

    let mut capturer = match radar_capture::Capturer::new(&config.app_dir, config.ip_override.as_deref())
    {
        Ok(c) => c,
        Err(err) => {
            eprintln!("FATAL: failed to start capture: {err}");
            std::process::exit(1);
        }
    };
    let adapter = capturer.interface().address.to_string();
    let capture_stop_token = capturer.stop_token();

    let stop = CancellationToken::new();

    let flush_task = tokio::spawn({
        let hub = hub.clone();
        async move { hub.run_flush_loop().await }
    });

    let decode_task = tokio::spawn({
        let stop = stop.clone();
        async move { decode_worker.run(stop).await }
    });

    let capture_stop = stop.clone();
    let capture_thread = std::thread::spawn(move || {
        let result = capturer.run(packet_handler);
        if let Err(err) = result {
            tracing::warn!(%err, "capture loop exited with an error");
        }
        capture_stop.cancel();
    });

    let app_state = AppState {
        hub: hub.clone(),
        log_sink: log_sink.clone(),
    };
    let public_dir = std::path::PathBuf::from("public");
    let router = server::build_router(app_state, Some(public_dir));

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(err) => {
            eprintln!("FATAL: failed to bind {}: {err}", config.bind_addr);
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_addr, "http/websocket server listening");

    let server_stop = stop.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
    });

    let dashboard_handle = if !dev_mode {
        let stats = stats.clone();
        let hub = hub.clone();
        let stop = stop.clone();
        let ctx = DashboardContext {
            adapter,
            bind_addr: config.bind_addr,
        };
        Some(tokio::task::spawn_blocking(move || dashboard::run(stats, hub, ctx, stop)))
    } else {
        None
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    stop.cancel();
    hub.shutdown().await;
    capture_stop_token.cancel();

    let shutdown = async {
        let _ = decode_task.await;
        let _ = flush_task.await;
        let _ = server_task.await;
        if let Some(handle) = dashboard_handle {
            let _ = handle.await;
        }
    };

    if tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown).await.is_err() {
        tracing::warn!("shutdown deadline exceeded, abandoning remaining workers");
    }

    if !capture_thread.is_finished() {
        tracing::warn!("capture thread did not exit before shutdown deadline");
    }

    info!("radar stopped");
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
