use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
};

/// How a child process went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// It had already exited on its own
    AlreadyExited,
    /// It exited within the grace period after being asked to
    Graceful,
    /// It ignored the request and was killed
    Killed,
}

/// A decode process owned by exactly one camera.
///
/// The child is killed when this value is dropped, so a worker that gets
/// aborted never leaks its process.
pub struct FfmpegProcess {
    name: String,
    child: Child,
}

impl FfmpegProcess {
    /// Spawns `cmd` with stdout captured. stderr is forwarded line by line to
    /// the log under the `ffmpeg` target.
    pub fn spawn(mut cmd: Command, name: &str) -> anyhow::Result<(Self, ChildStdout)> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("{}: spawn decoder process: {}", name, e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("{}: decoder stdout not captured", name))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(name.to_string(), stderr));
        }

        log::debug!("{}: decoder process started, pid {:?}", name, child.id());
        Ok((
            Self {
                name: name.to_string(),
                child,
            },
            stdout,
        ))
    }

    /// Asks the process to exit, waits up to `timeout`, then kills it.
    pub async fn terminate(mut self, timeout: Duration) -> Termination {
        if let Ok(Some(status)) = self.child.try_wait() {
            log::debug!("{}: decoder process already exited: {}", self.name, status);
            return Termination::AlreadyExited;
        }

        self.request_exit();

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                log::debug!("{}: decoder process exited: {}", self.name, status);
                Termination::Graceful
            }
            Ok(Err(e)) => {
                log::warn!("{}: wait for decoder process failed: {}", self.name, e);
                self.kill().await
            }
            Err(_) => {
                log::warn!(
                    "{}: decoder process still alive after {:?}, killing",
                    self.name,
                    timeout
                );
                self.kill().await
            }
        }
    }

    async fn kill(&mut self) -> Termination {
        if let Err(e) = self.child.kill().await {
            log::error!("{}: kill decoder process: {}", self.name, e);
        }
        Termination::Killed
    }

    #[cfg(unix)]
    fn request_exit(&self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        // SAFETY: pid belongs to a child we have not reaped yet
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            log::warn!(
                "{}: SIGTERM to pid {}: {}",
                self.name,
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    // No graceful signal available, the timeout then escalates to a kill.
    #[cfg(not(unix))]
    fn request_exit(&self) {}
}

async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!(target: "ffmpeg", "{}: {}", name, line);
    }
}
