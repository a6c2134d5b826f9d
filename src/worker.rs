use std::{sync::Arc, time::Duration};

use ffmpeg_bus::frame::VideoFrame;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{Camera, WorkerPhase},
    pipeline::{Pipeline, PipelineOpener},
    shutdown::ShutdownCoordinator,
};

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Wait between a failed attempt and the next connect.
    pub backoff: Duration,
    /// How long a pipeline gets to exit before it is killed.
    pub shutdown_timeout: Duration,
    /// Longest wait for a frame before the pipeline counts as failed.
    pub stall_timeout: Option<Duration>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
        }
    }
}

enum StreamEnd {
    Cancelled,
    Failed(String),
}

/// Keeps one camera's pipeline running and publishes every decoded frame.
pub struct CaptureWorker<O: PipelineOpener> {
    camera: Arc<Camera>,
    opener: Arc<O>,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl<O: PipelineOpener> CaptureWorker<O> {
    pub fn new(
        camera: Arc<Camera>,
        opener: Arc<O>,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            camera,
            opener,
            settings,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let name = self.camera.name().to_string();
        log::info!("{}: capture worker started ({})", name, self.camera.config().source_url);

        loop {
            self.camera.set_phase(WorkerPhase::Connecting);
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.camera.set_phase(WorkerPhase::Terminating);
                    break;
                }
                opened = self.opener.open(self.camera.config()) => opened,
            };

            match opened {
                Ok(pipeline) => {
                    self.camera.set_phase(WorkerPhase::Streaming);
                    match self.stream(pipeline).await {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Failed(reason) => log::warn!("{}: stream lost: {}", name, reason),
                    }
                }
                Err(e) => log::warn!("{}: connect failed: {:#}", name, e),
            }

            self.camera.set_phase(WorkerPhase::Backoff);
            log::info!("{}: reconnecting in {:?}", name, self.settings.backoff);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.camera.set_phase(WorkerPhase::Terminating);
                    break;
                }
                _ = tokio::time::sleep(self.settings.backoff) => {}
            }
            self.camera.count_reconnect();
        }

        self.camera.set_phase(WorkerPhase::Terminated);
        log::info!("{}: capture worker stopped", name);
    }

    /// Pulls frames until the pipeline ends or the worker is cancelled. The
    /// pipeline is released before this returns.
    async fn stream(&self, mut pipeline: O::Pipeline) -> StreamEnd {
        let name = self.camera.name();
        let mut first = true;

        let end = loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break StreamEnd::Cancelled,
                next = next_frame(&mut pipeline, self.settings.stall_timeout) => next,
            };
            match next {
                Ok(Some(frame)) => {
                    if first {
                        log::info!("{}: streaming {}", name, frame);
                        first = false;
                    }
                    let version = self.camera.frames().publish(frame);
                    log::trace!("{}: frame {}", name, version);
                }
                Ok(None) => break StreamEnd::Failed("end of stream".to_string()),
                Err(e) => break StreamEnd::Failed(format!("{:#}", e)),
            }
        };

        if let StreamEnd::Cancelled = end {
            self.camera.set_phase(WorkerPhase::Terminating);
        }
        let outcome = pipeline.terminate(self.settings.shutdown_timeout).await;
        log::debug!("{}: pipeline released ({:?})", name, outcome);
        end
    }
}

async fn next_frame<P: Pipeline>(
    pipeline: &mut P,
    stall_timeout: Option<Duration>,
) -> anyhow::Result<Option<VideoFrame>> {
    match stall_timeout {
        Some(limit) => match tokio::time::timeout(limit, pipeline.next_frame()).await {
            Ok(next) => next,
            Err(_) => anyhow::bail!("no frame within {:?}", limit),
        },
        None => pipeline.next_frame().await,
    }
}

/// Starts one worker per camera and hands each to the coordinator.
pub fn spawn_workers<O: PipelineOpener>(
    cameras: impl IntoIterator<Item = Arc<Camera>>,
    opener: Arc<O>,
    settings: WorkerSettings,
    coordinator: &mut ShutdownCoordinator,
) {
    for camera in cameras {
        let name = camera.name().to_string();
        let worker = CaptureWorker::new(camera, opener.clone(), settings, coordinator.token());
        coordinator.register(name, worker.spawn());
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
