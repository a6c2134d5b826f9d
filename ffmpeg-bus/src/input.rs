use std::path::PathBuf;

use tokio::process::Command;

/// What to decode and with which ffmpeg binary.
#[derive(Clone, Debug)]
pub struct InputConfig {
    /// Used to tag log lines
    pub name: String,
    pub url: String,
    pub ffmpeg: PathBuf,
}

impl InputConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn is_rtsp(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        url.starts_with("rtsp://") || url.starts_with("rtsps://")
    }

    /// Low latency decode to a yuv420p Y4M stream on stdout, video only.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-loglevel",
            "error",
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-strict",
            "experimental",
            "-fflags",
            "+genpts",
            "-avioflags",
            "direct",
            "-probesize",
            "512k",
            "-analyzeduration",
            "0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.is_rtsp() {
            args.push("-rtsp_transport".to_string());
            args.push("tcp".to_string());
        }

        args.push("-i".to_string());
        args.push(self.url.clone());

        args.extend(
            [
                "-an",
                "-sn",
                "-dn",
                "-pix_fmt",
                "yuv420p",
                "-f",
                "yuv4mpegpipe",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(self.args());
        cmd
    }
}
