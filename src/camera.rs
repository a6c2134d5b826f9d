use std::{
    fmt,
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
};

use bytes::Bytes;
use serde::Serialize;

use crate::{
    cache::FrameCache,
    registry::CameraConfig,
    snapshot::{FrameEncoder, SnapshotError, SnapshotSlot},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerPhase {
    Connecting = 0,
    Streaming = 1,
    Backoff = 2,
    Terminating = 3,
    Terminated = 4,
}

impl WorkerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerPhase::Connecting,
            1 => WorkerPhase::Streaming,
            2 => WorkerPhase::Backoff,
            3 => WorkerPhase::Terminating,
            _ => WorkerPhase::Terminated,
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerPhase::Connecting => "connecting",
            WorkerPhase::Streaming => "streaming",
            WorkerPhase::Backoff => "backoff",
            WorkerPhase::Terminating => "terminating",
            WorkerPhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Everything the process keeps for one camera.
///
/// The capture worker is the only writer of `frames`, the phase and the
/// reconnect counter. Requests read `frames` and share the encoded slot.
pub struct Camera {
    config: CameraConfig,
    frames: FrameCache,
    slot: SnapshotSlot,
    phase: AtomicU8,
    reconnects: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub name: String,
    pub source: String,
    pub state: WorkerPhase,
    pub frame_version: u64,
    pub reconnects: u64,
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frames: FrameCache::new(),
            slot: SnapshotSlot::default(),
            phase: AtomicU8::new(WorkerPhase::Connecting as u8),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameCache {
        &self.frames
    }

    pub fn phase(&self) -> WorkerPhase {
        WorkerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub(crate) fn count_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Encoded snapshot of the latest frame.
    ///
    /// Blocking: encodes on a cache miss. The version is read once, so the
    /// returned bytes are never older than the frame observed at entry.
    pub fn snapshot(&self, encoder: &dyn FrameEncoder) -> Result<Bytes, SnapshotError> {
        let published = self.frames.latest();
        let Some(frame) = published.frame else {
            return Err(SnapshotError::NotReady(self.config.name.clone()));
        };

        if let Some(bytes) = self.slot.get(published.version) {
            return Ok(bytes);
        }

        let bytes = encoder.encode(&frame).map_err(|e| {
            SnapshotError::Encoding(e.context(format!(
                "{} frame {}",
                self.config.name, published.version
            )))
        })?;
        self.slot.store(published.version, bytes.clone());
        Ok(bytes)
    }

    pub fn status(&self) -> CameraStatus {
        CameraStatus {
            name: self.config.name.clone(),
            source: self.config.source_url.clone(),
            state: self.phase(),
            frame_version: self.frames.version(),
            reconnects: self.reconnects(),
        }
    }
}
