//! Decoder for the `yuv4mpegpipe` stream ffmpeg writes to stdout.
//!
//! The stream is one header line (`YUV4MPEG2 W.. H.. F.. C..`) followed by
//! `FRAME` lines, each followed by exactly one planar picture.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::frame::{MAX_DIMENSION, PixelLayout, VideoFrame};

const MAGIC: &str = "YUV4MPEG2";
const FRAME_TAG: &[u8] = b"FRAME";
// header and frame lines are short, anything longer is garbage
const MAX_LINE: u64 = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    /// `(numerator, denominator)` when the stream declares it
    pub frame_rate: Option<(u32, u32)>,
}

impl StreamHeader {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some(MAGIC) {
            anyhow::bail!("not a {} stream: {:?}", MAGIC, line);
        }

        let mut width = None;
        let mut height = None;
        let mut layout = PixelLayout::Yuv420p;
        let mut frame_rate = None;
        for token in tokens {
            let mut chars = token.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('W') => width = Some(parse_dimension("width", value)?),
                Some('H') => height = Some(parse_dimension("height", value)?),
                Some('C') => layout = parse_layout(value)?,
                Some('F') => frame_rate = parse_ratio(value),
                _ => {}
            }
        }

        Ok(Self {
            width: width.ok_or_else(|| anyhow::anyhow!("stream header has no width"))?,
            height: height.ok_or_else(|| anyhow::anyhow!("stream header has no height"))?,
            layout,
            frame_rate,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.layout.frame_len(self.width, self.height)
    }
}

fn parse_dimension(what: &str, value: &str) -> anyhow::Result<u32> {
    let n: u32 = value
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", what, value, e))?;
    if n == 0 || n > MAX_DIMENSION {
        anyhow::bail!("{} {} out of range", what, n);
    }
    Ok(n)
}

fn parse_layout(value: &str) -> anyhow::Result<PixelLayout> {
    match value {
        "420" | "420jpeg" | "420mpeg2" | "420paldv" => Ok(PixelLayout::Yuv420p),
        "422" => Ok(PixelLayout::Yuv422p),
        "444" => Ok(PixelLayout::Yuv444p),
        "mono" => Ok(PixelLayout::Gray),
        _ => Err(anyhow::anyhow!("unsupported pixel layout C{}", value)),
    }
}

fn parse_ratio(value: &str) -> Option<(u32, u32)> {
    let (num, den) = value.split_once(':')?;
    Some((num.parse().ok()?, den.parse().ok()?))
}

pub struct Y4mDecoder<R> {
    reader: BufReader<R>,
    header: Option<StreamHeader>,
    frames: u64,
}

impl<R: AsyncRead + Unpin> Y4mDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            header: None,
            frames: 0,
        }
    }

    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Number of frames decoded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Read one `\n` terminated line. `None` on a clean end of stream.
    async fn read_line(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_LINE)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        if line.pop() != Some(b'\n') {
            anyhow::bail!("unterminated stream line ({} bytes)", n);
        }
        Ok(Some(line))
    }

    /// Reads the stream header if it has not been read yet.
    /// Returns `None` when the stream ends before a header arrives.
    pub async fn read_header(&mut self) -> anyhow::Result<Option<&StreamHeader>> {
        if self.header.is_none() {
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };
            let line = String::from_utf8(line)
                .map_err(|_| anyhow::anyhow!("stream header is not text"))?;
            let header = StreamHeader::parse(&line)?;
            log::debug!(
                "y4m stream: {}x{} {} rate {:?}",
                header.width,
                header.height,
                header.layout,
                header.frame_rate
            );
            self.header = Some(header);
        }
        Ok(self.header.as_ref())
    }

    /// Next decoded frame, `None` at end of stream.
    pub async fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        let Some(header) = self.read_header().await?.cloned() else {
            return Ok(None);
        };

        let Some(line) = self.read_line().await? else {
            return Ok(None);
        };
        if !line.starts_with(FRAME_TAG) {
            anyhow::bail!("expected FRAME marker, got {:?}", String::from_utf8_lossy(&line));
        }

        let expected = header.frame_len();
        let mut data = vec![0u8; expected];
        if let Err(e) = self.reader.read_exact(&mut data).await {
            anyhow::bail!(
                "truncated frame {} ({} bytes expected): {}",
                self.frames,
                expected,
                e
            );
        }

        let frame = VideoFrame::new(data, header.width, header.height, header.layout)?
            .with_seq(self.frames);
        self.frames += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
