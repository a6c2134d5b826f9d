use std::sync::Arc;

use ffmpeg_bus::frame::VideoFrame;
use tokio::sync::watch;

/// What readers observe: the latest frame and its version, always together.
#[derive(Clone, Debug, Default)]
pub struct PublishedFrame {
    pub version: u64,
    pub frame: Option<Arc<VideoFrame>>,
}

/// Latest decoded frame of one camera.
///
/// Written by exactly one capture worker, read by any number of requests.
/// Version 0 means nothing has been decoded yet.
pub struct FrameCache {
    tx: watch::Sender<PublishedFrame>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(PublishedFrame::default()),
        }
    }

    /// Replaces the frame and bumps the version in one step.
    pub fn publish(&self, frame: VideoFrame) -> u64 {
        let frame = Arc::new(frame);
        let mut version = 0;
        self.tx.send_modify(|published| {
            published.version += 1;
            published.frame = Some(frame);
            version = published.version;
        });
        version
    }

    pub fn latest(&self) -> PublishedFrame {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<PublishedFrame> {
        self.tx.subscribe()
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}
