use std::sync::{Mutex, PoisonError};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use ffmpeg_bus::frame::{PixelLayout, VideoFrame};
use jpeg_encoder::{ColorType, Encoder};

pub const DEFAULT_QUALITY: u8 = 100;

/// Turns a decoded frame into still-image bytes.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &VideoFrame) -> anyhow::Result<Bytes>;

    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}

pub struct JpegSnapshotEncoder {
    quality: u8,
}

impl JpegSnapshotEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegSnapshotEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegSnapshotEncoder {
    fn encode(&self, frame: &VideoFrame) -> anyhow::Result<Bytes> {
        let (Ok(width), Ok(height)) = (u16::try_from(frame.width()), u16::try_from(frame.height()))
        else {
            anyhow::bail!("{} too large for jpeg", frame);
        };

        let mut buf = Vec::new();
        let encoder = Encoder::new(&mut buf, self.quality);
        let result = match frame.layout() {
            PixelLayout::Gray => encoder.encode(frame.luma(), width, height, ColorType::Luma),
            _ => encoder.encode(&frame.to_rgb(), width, height, ColorType::Rgb),
        };
        result.map_err(|e| anyhow::anyhow!("jpeg encode {}: {}", frame, e))?;
        Ok(Bytes::from(buf))
    }
}

/// Encoded bytes of one camera, tagged with the frame version they came from.
#[derive(Default)]
pub struct SnapshotSlot {
    inner: Mutex<Option<(u64, Bytes)>>,
}

impl SnapshotSlot {
    /// Bytes for exactly `version`, if that is what the slot holds.
    pub fn get(&self, version: u64) -> Option<Bytes> {
        let slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Some((v, bytes)) if *v == version => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Stores unless the slot already holds a newer version.
    pub fn store(&self, version: u64, bytes: Bytes) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*slot, Some((v, _)) if *v > version) {
            return;
        }
        *slot = Some((version, bytes));
    }

    #[cfg(test)]
    pub fn version(&self) -> Option<u64> {
        let slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|(v, _)| *v)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("camera {0} not found")]
    NotFound(String),
    #[error("camera {0} has no frame yet")]
    NotReady(String),
    #[error("encoding failed: {0:#}")]
    Encoding(anyhow::Error),
}

impl SnapshotError {
    pub fn status(&self) -> StatusCode {
        match self {
            SnapshotError::NotFound(_) => StatusCode::NOT_FOUND,
            SnapshotError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            SnapshotError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SnapshotError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let SnapshotError::Encoding(_) = self {
            log::error!("snapshot: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(layout: PixelLayout, w: u32, h: u32) -> VideoFrame {
        VideoFrame::new(vec![128; layout.frame_len(w, h)], w, h, layout).unwrap()
    }

    fn assert_jpeg(bytes: &[u8]) {
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_yuv420() {
        let bytes = JpegSnapshotEncoder::default()
            .encode(&frame(PixelLayout::Yuv420p, 64, 48))
            .unwrap();
        assert_jpeg(&bytes);
    }

    #[test]
    fn test_encode_odd_size_and_gray() {
        let encoder = JpegSnapshotEncoder::new(80);
        assert_jpeg(&encoder.encode(&frame(PixelLayout::Yuv420p, 17, 9)).unwrap());
        assert_jpeg(&encoder.encode(&frame(PixelLayout::Gray, 8, 8)).unwrap());
        assert_jpeg(&encoder.encode(&frame(PixelLayout::Yuv444p, 3, 3)).unwrap());
    }

    #[test]
    fn test_encode_largest_width() {
        let wide = frame(PixelLayout::Gray, ffmpeg_bus::frame::MAX_DIMENSION, 1);
        assert_jpeg(&JpegSnapshotEncoder::default().encode(&wide).unwrap());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegSnapshotEncoder::new(0).quality, 1);
        assert_eq!(JpegSnapshotEncoder::new(255).quality, 100);
    }

    #[test]
    fn test_slot_matches_exact_version() {
        let slot = SnapshotSlot::default();
        assert!(slot.get(0).is_none());

        slot.store(3, Bytes::from_static(b"three"));
        assert_eq!(slot.get(3).unwrap(), Bytes::from_static(b"three"));
        assert!(slot.get(2).is_none());
        assert!(slot.get(4).is_none());
    }

    #[test]
    fn test_slot_never_regresses() {
        let slot = SnapshotSlot::default();
        slot.store(5, Bytes::from_static(b"five"));
        slot.store(4, Bytes::from_static(b"four"));
        assert_eq!(slot.version(), Some(5));
        assert!(slot.get(4).is_none());

        slot.store(6, Bytes::from_static(b"six"));
        assert_eq!(slot.get(6).unwrap(), Bytes::from_static(b"six"));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            SnapshotError::NotFound("cam2".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SnapshotError::NotReady("cam1".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SnapshotError::Encoding(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
