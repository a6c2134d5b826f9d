use std::time::Duration;

use futures::future::join_all;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

/// Extra time a worker gets on top of the pipeline shutdown timeout.
pub const SCHEDULING_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub aborted: Vec<String>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Owns the cancellation tree and the join handles of every capture worker.
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    timeout: Duration,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl ShutdownCoordinator {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            timeout,
            workers: Vec::new(),
        }
    }

    /// A token that fires when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn register(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.workers.push((name.into(), handle));
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker and waits for all of them at once. A worker that
    /// does not finish within the timeout plus slack is aborted, which drops
    /// its pipeline.
    pub async fn shutdown(self) -> ShutdownReport {
        let started = Instant::now();
        let bound = self.timeout + SCHEDULING_SLACK;
        log::info!("shutting down {} capture workers", self.workers.len());
        self.cancel.cancel();

        let waits = self.workers.into_iter().map(|(name, mut handle)| async move {
            match tokio::time::timeout(bound, &mut handle).await {
                Ok(Ok(())) => (name, true),
                Ok(Err(e)) => {
                    log::error!("{}: capture worker failed: {}", name, e);
                    (name, true)
                }
                Err(_) => {
                    log::warn!("{}: capture worker still running after {:?}, aborting", name, bound);
                    handle.abort();
                    let _ = handle.await;
                    (name, false)
                }
            }
        });

        let mut report = ShutdownReport::default();
        for (name, stopped) in join_all(waits).await {
            if stopped {
                report.stopped.push(name);
            } else {
                report.aborted.push(name);
            }
        }
        report.elapsed = started.elapsed();
        log::info!(
            "shutdown finished in {:?}: {} stopped, {} aborted",
            report.elapsed,
            report.stopped.len(),
            report.aborted.len()
        );
        report
    }
}
