use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SnapConfig, mediamtx::MediaMtxConfig, pipeline::FfmpegOpener,
    registry::CameraRegistry, service::SnapshotService, shutdown::ShutdownCoordinator,
    snapshot::JpegSnapshotEncoder,
};

mod api;
mod cache;
mod camera;
mod config;
mod mediamtx;
mod pipeline;
mod registry;
mod service;
mod shutdown;
mod snapshot;
#[cfg(test)]
mod test_support;
mod worker;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("snapfeeder", level)
        .filter_module("ffmpeg_bus", level)
        .parse_default_env()
        .init();
}

fn fatal(message: String) -> ! {
    log::error!("{}", message);
    std::process::exit(1);
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            log::warn!("cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> ! {
    let config = SnapConfig::parse();
    init_logging(config.log_level);

    match ffmpeg_bus::init(&config.ffmpeg) {
        Ok(version) => log::info!("{}", version),
        Err(e) => fatal(format!("ffmpeg unavailable: {:#}", e)),
    }

    let registry = CameraRegistry::load(&MediaMtxConfig::new(&config.config))
        .unwrap_or_else(|e| fatal(format!("{}: {}", config.config.display(), e)));
    log::info!(
        "{} cameras from {}",
        registry.len(),
        config.config.display()
    );

    let encoder = Arc::new(JpegSnapshotEncoder::new(config.quality));
    let service = Arc::new(SnapshotService::new(&registry, encoder));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fatal(format!("bind {}: {}", addr, e)));

    let cancel = CancellationToken::new();
    let mut coordinator = ShutdownCoordinator::new(cancel.clone(), config.shutdown_timeout());
    worker::spawn_workers(
        service.cameras().cloned(),
        Arc::new(FfmpegOpener::new(&config.ffmpeg)),
        config.worker_settings(),
        &mut coordinator,
    );
    log::info!("started {} capture workers", coordinator.len());
    let server = api::start_api_server(
        listener,
        service.clone(),
        cancel.child_token(),
        config.shutdown_timeout(),
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                cancel.cancel();
            },
            _ = terminate_signal() => {
                log::info!("terminated");
                cancel.cancel();
            },
        }
    }

    let report = coordinator.shutdown().await;
    if !report.is_clean() {
        log::warn!("aborted capture workers: {}", report.aborted.join(", "));
    }
    if let Err(e) = server.await {
        log::error!("API server task: {}", e);
    }

    std::process::exit(0);
}
