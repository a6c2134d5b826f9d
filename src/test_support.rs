//! Scripted pipelines and encoders for worker, service and api tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use ffmpeg_bus::{
    frame::{PixelLayout, VideoFrame},
    process::Termination,
};
use tokio::time::Instant;

use crate::{
    pipeline::{Pipeline, PipelineOpener},
    registry::CameraConfig,
    snapshot::FrameEncoder,
};

/// A 2x2 gray frame whose luma is `value` everywhere.
pub fn solid_frame(value: u8) -> VideoFrame {
    VideoFrame::new(vec![value; 4], 2, 2, PixelLayout::Gray).unwrap()
}

/// Encodes a frame as `frame-<luma>` and counts calls.
#[derive(Default)]
pub struct CountingEncoder {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingEncoder {
    pub fn failing() -> Self {
        let encoder = Self::default();
        encoder.fail.store(true, Ordering::SeqCst);
        encoder
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn version_of(bytes: &[u8]) -> u64 {
        std::str::from_utf8(bytes)
            .unwrap()
            .strip_prefix("frame-")
            .unwrap()
            .parse()
            .unwrap()
    }
}

impl FrameEncoder for CountingEncoder {
    fn encode(&self, frame: &VideoFrame) -> anyhow::Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("encoder out of memory");
        }
        Ok(Bytes::from(format!("frame-{}", frame.luma()[0])))
    }
}

#[derive(Clone, Debug)]
pub enum Step {
    Frame(u8),
    Sleep(Duration),
    Fail(&'static str),
    /// Never yields another frame.
    Hang,
}

#[derive(Clone, Debug)]
pub enum Session {
    Refuse(&'static str),
    /// Opening never completes.
    HangOpen,
    /// Plays the steps, then reports end of stream.
    Play(Vec<Step>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnTerminate {
    Exit,
    /// Ignores the graceful request and is killed after the timeout.
    Stubborn,
    /// Never finishes terminating.
    Wedged,
}

/// Per-camera counters shared with the pipelines an opener hands out.
#[derive(Default)]
pub struct Tracker {
    opens: Mutex<Vec<Instant>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    terminated: AtomicUsize,
}

impl Tracker {
    pub fn opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    /// Pipelines handed out and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Hands out scripted sessions per camera. Once a camera's script is used
/// up, further opens are refused.
pub struct ScriptedOpener {
    scripts: Mutex<HashMap<String, VecDeque<Session>>>,
    trackers: Mutex<HashMap<String, Arc<Tracker>>>,
    on_terminate: OnTerminate,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
            on_terminate: OnTerminate::Exit,
        }
    }

    pub fn script(self, camera: &str, sessions: Vec<Session>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(camera.to_string(), sessions.into());
        self
    }

    pub fn on_terminate(mut self, on_terminate: OnTerminate) -> Self {
        self.on_terminate = on_terminate;
        self
    }

    pub fn tracker(&self, camera: &str) -> Arc<Tracker> {
        self.trackers
            .lock()
            .unwrap()
            .entry(camera.to_string())
            .or_default()
            .clone()
    }
}

impl PipelineOpener for ScriptedOpener {
    type Pipeline = ScriptedPipeline;

    async fn open(&self, camera: &CameraConfig) -> anyhow::Result<ScriptedPipeline> {
        let tracker = self.tracker(&camera.name);
        tracker.opens.lock().unwrap().push(Instant::now());
        let session = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&camera.name)
            .and_then(VecDeque::pop_front);

        match session {
            None => anyhow::bail!("{}: connection refused", camera.name),
            Some(Session::Refuse(reason)) => anyhow::bail!("{}: {}", camera.name, reason),
            Some(Session::HangOpen) => std::future::pending().await,
            Some(Session::Play(steps)) => {
                let live = tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
                tracker.max_live.fetch_max(live, Ordering::SeqCst);
                Ok(ScriptedPipeline {
                    steps: steps.into(),
                    on_terminate: self.on_terminate,
                    tracker,
                })
            }
        }
    }
}

pub struct ScriptedPipeline {
    steps: VecDeque<Step>,
    on_terminate: OnTerminate,
    tracker: Arc<Tracker>,
}

impl Drop for ScriptedPipeline {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Pipeline for ScriptedPipeline {
    async fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        loop {
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Frame(value)) => return Ok(Some(solid_frame(value))),
                Some(Step::Sleep(duration)) => tokio::time::sleep(duration).await,
                Some(Step::Fail(reason)) => anyhow::bail!("{}", reason),
                Some(Step::Hang) => std::future::pending().await,
            }
        }
    }

    async fn terminate(self, timeout: Duration) -> Termination {
        let outcome = match self.on_terminate {
            OnTerminate::Exit => Termination::Graceful,
            OnTerminate::Stubborn => {
                tokio::time::sleep(timeout).await;
                Termination::Killed
            }
            OnTerminate::Wedged => std::future::pending().await,
        };
        self.tracker.terminated.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}
