use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Largest width or height accepted from a decode pipeline.
pub const MAX_DIMENSION: u32 = 16384;

/// Planar 8-bit layouts a decode pipeline may hand over.
///
/// Chroma planes are subsampled with rounding up, so odd-sized frames keep
/// their last column/row of chroma.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    /// Luma only
    Gray,
}

impl PixelLayout {
    /// Width and height of each chroma plane, `(0, 0)` for [`PixelLayout::Gray`].
    pub fn chroma_size(self, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelLayout::Yuv420p => (w.div_ceil(2), h.div_ceil(2)),
            PixelLayout::Yuv422p => (w.div_ceil(2), h),
            PixelLayout::Yuv444p => (w, h),
            PixelLayout::Gray => (0, 0),
        }
    }

    /// Total number of bytes of one frame in this layout.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let (cw, ch) = self.chroma_size(width, height);
        width as usize * height as usize + 2 * cw * ch
    }
}

impl Display for PixelLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            PixelLayout::Yuv420p => "yuv420p",
            PixelLayout::Yuv422p => "yuv422p",
            PixelLayout::Yuv444p => "yuv444p",
            PixelLayout::Gray => "gray",
        };
        f.write_str(name)
    }
}

/// One decoded picture. Cheap to clone, the pixel data is shared.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    data: Bytes,
    width: u32,
    height: u32,
    layout: PixelLayout,
    // position in the stream it was decoded from, starting at 0
    seq: u64,
}

impl VideoFrame {
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> anyhow::Result<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            anyhow::bail!("invalid video size {}x{}", width, height);
        }
        let data = data.into();
        let expected = layout.frame_len(width, height);
        if data.len() != expected {
            anyhow::bail!(
                "{} frame {}x{} needs {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                data.len()
            );
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            seq: 0,
        })
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    /// Convert the frame to packed RGB24 (BT.601, full range).
    pub fn to_rgb(&self) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let y_size = width * height;

        let mut rgb = Vec::with_capacity(y_size * 3);
        if self.layout == PixelLayout::Gray {
            for &y in self.luma() {
                rgb.extend_from_slice(&[y, y, y]);
            }
            return rgb;
        }

        let (uv_width, uv_height) = self.layout.chroma_size(self.width, self.height);
        let uv_size = uv_width * uv_height;

        let y_plane = &self.data[0..y_size];
        let u_plane = &self.data[y_size..y_size + uv_size];
        let v_plane = &self.data[y_size + uv_size..y_size + uv_size * 2];

        for j in 0..height {
            for i in 0..width {
                let uv_idx = match self.layout {
                    PixelLayout::Yuv420p => (j / 2) * uv_width + (i / 2),
                    PixelLayout::Yuv422p => j * uv_width + (i / 2),
                    _ => j * uv_width + i,
                };

                let y = y_plane[j * width + i] as f32;
                let u = u_plane[uv_idx] as f32 - 128.0;
                let v = v_plane[uv_idx] as f32 - 128.0;

                let r = (y + 1.402 * v).round().clamp(0.0, 255.0) as u8;
                let g = (y - 0.344136 * u - 0.714136 * v).round().clamp(0.0, 255.0) as u8;
                let b = (y + 1.772 * u).round().clamp(0.0, 255.0) as u8;

                rgb.push(r);
                rgb.push(g);
                rgb.push(b);
            }
        }

        rgb
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "VideoFrame seq: {}, {}x{} {}, data_len: {}",
            self.seq,
            self.width,
            self.height,
            self.layout,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, layout: PixelLayout, y: u8, u: u8, v: u8) -> VideoFrame {
        let y_size = (width * height) as usize;
        let (cw, ch) = layout.chroma_size(width, height);
        let mut data = vec![y; y_size];
        data.extend(std::iter::repeat_n(u, cw * ch));
        data.extend(std::iter::repeat_n(v, cw * ch));
        VideoFrame::new(data, width, height, layout).unwrap()
    }

    #[test]
    fn test_frame_len_rounds_chroma_up() {
        assert_eq!(PixelLayout::Yuv420p.frame_len(4, 4), 16 + 2 * 4);
        assert_eq!(PixelLayout::Yuv420p.frame_len(3, 3), 9 + 2 * 4);
        assert_eq!(PixelLayout::Yuv422p.frame_len(3, 2), 6 + 2 * 4);
        assert_eq!(PixelLayout::Yuv444p.frame_len(2, 2), 12);
        assert_eq!(PixelLayout::Gray.frame_len(5, 3), 15);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = VideoFrame::new(vec![0u8; 10], 4, 4, PixelLayout::Yuv420p).unwrap_err();
        assert!(err.to_string().contains("needs 24 bytes"));
    }

    #[test]
    fn test_new_rejects_bad_size() {
        assert!(VideoFrame::new(Vec::new(), 0, 4, PixelLayout::Gray).is_err());
        assert!(VideoFrame::new(vec![0u8; 16385], 16385, 1, PixelLayout::Gray).is_err());
    }

    #[test]
    fn test_to_rgb_white_and_black() {
        let white = solid(2, 2, PixelLayout::Yuv420p, 255, 128, 128);
        assert!(white.to_rgb().iter().all(|&c| c == 255));

        let black = solid(2, 2, PixelLayout::Yuv420p, 0, 128, 128);
        assert!(black.to_rgb().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_to_rgb_red() {
        // BT.601 full range red
        let red = solid(3, 3, PixelLayout::Yuv420p, 76, 85, 255);
        let rgb = red.to_rgb();
        assert_eq!(rgb.len(), 27);
        for px in rgb.chunks(3) {
            assert!(px[0] >= 250, "r = {}", px[0]);
            assert!(px[1] <= 5, "g = {}", px[1]);
            assert!(px[2] <= 5, "b = {}", px[2]);
        }
    }

    #[test]
    fn test_to_rgb_gray_layout() {
        let gray = VideoFrame::new(vec![10u8, 20, 30], 3, 1, PixelLayout::Gray).unwrap();
        assert_eq!(gray.to_rgb(), vec![10, 10, 10, 20, 20, 20, 30, 30, 30]);
    }

    #[test]
    fn test_to_rgb_444_uses_per_pixel_chroma() {
        // left pixel neutral, right pixel strong blue chroma
        let data = vec![128u8, 128, 128, 255, 128, 128];
        let frame = VideoFrame::new(data, 2, 1, PixelLayout::Yuv444p).unwrap();
        let rgb = frame.to_rgb();
        assert_eq!(&rgb[0..3], &[128, 128, 128]);
        assert_eq!(rgb[5], 255);
    }
}
