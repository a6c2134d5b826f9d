use std::time::Duration;

use tokio::process::{ChildStdout, Command};

use crate::{
    decoder::Y4mDecoder,
    frame::VideoFrame,
    input::InputConfig,
    process::{FfmpegProcess, Termination},
};

/// One running decode: the ffmpeg process and the decoder reading its output.
pub struct FfmpegPipe {
    name: String,
    process: FfmpegProcess,
    decoder: Y4mDecoder<ChildStdout>,
}

impl FfmpegPipe {
    pub fn open(input: &InputConfig) -> anyhow::Result<Self> {
        log::info!("{}: opening {}", input.name, input.url);
        Self::spawn(input.command(), &input.name)
    }

    /// Runs an arbitrary command that writes a Y4M stream to stdout.
    pub fn spawn(cmd: Command, name: &str) -> anyhow::Result<Self> {
        let (process, stdout) = FfmpegProcess::spawn(cmd, name)?;
        Ok(Self {
            name: name.to_string(),
            process,
            decoder: Y4mDecoder::new(stdout),
        })
    }

    /// Waits for the next decoded frame. `None` once the process closed its output.
    pub async fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        self.decoder
            .next_frame()
            .await
            .map_err(|e| e.context(format!("{}: decode", self.name)))
    }

    pub async fn terminate(self, timeout: Duration) -> Termination {
        let Self {
            name,
            process,
            decoder,
        } = self;
        // closing the pipe first unblocks a process stuck writing to it
        drop(decoder);
        let outcome = process.terminate(timeout).await;
        log::debug!("{}: pipe released ({:?})", name, outcome);
        outcome
    }
}
