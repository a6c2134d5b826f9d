use std::{future::Future, path::PathBuf, time::Duration};

use ffmpeg_bus::{frame::VideoFrame, input::InputConfig, pipe::FfmpegPipe, process::Termination};

use crate::registry::CameraConfig;

/// A running decode for one camera, owned by that camera's worker.
pub trait Pipeline: Send + 'static {
    /// Waits for the next decoded frame. `Ok(None)` means end of stream.
    fn next_frame(&mut self) -> impl Future<Output = anyhow::Result<Option<VideoFrame>>> + Send;

    /// Graceful stop, escalating to a forced one after `timeout`.
    fn terminate(self, timeout: Duration) -> impl Future<Output = Termination> + Send;
}

/// Creates a fresh [`Pipeline`] for every connection attempt.
pub trait PipelineOpener: Send + Sync + 'static {
    type Pipeline: Pipeline;

    fn open(
        &self,
        camera: &CameraConfig,
    ) -> impl Future<Output = anyhow::Result<Self::Pipeline>> + Send;
}

impl Pipeline for FfmpegPipe {
    async fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        FfmpegPipe::next_frame(self).await
    }

    async fn terminate(self, timeout: Duration) -> Termination {
        FfmpegPipe::terminate(self, timeout).await
    }
}

/// Opens one ffmpeg child process per connection attempt.
pub struct FfmpegOpener {
    ffmpeg: PathBuf,
}

impl FfmpegOpener {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl PipelineOpener for FfmpegOpener {
    type Pipeline = FfmpegPipe;

    async fn open(&self, camera: &CameraConfig) -> anyhow::Result<FfmpegPipe> {
        let input =
            InputConfig::new(&camera.name, &camera.source_url).with_ffmpeg(self.ffmpeg.clone());
        FfmpegPipe::open(&input)
    }
}
