use std::path::Path;

/// Checks that the ffmpeg binary can be run. Call once at startup.
///
/// Returns the first line of `ffmpeg -version`.
pub fn init(ffmpeg: &Path) -> anyhow::Result<String> {
    let output = std::process::Command::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg {}: {}", ffmpeg.display(), e))?;
    if !output.status.success() {
        anyhow::bail!("ffmpeg {} -version: {}", ffmpeg.display(), output.status);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

pub mod decoder;
pub mod frame;
pub mod input;
pub mod pipe;
pub mod process;
