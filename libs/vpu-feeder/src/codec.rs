//! Codec identification and container-supplied stream geometry.

use crate::{Error, Result};

/// Compressed video formats the hardware engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    H264,
    H263,
    Mpeg2,
    Mpeg4,
}

impl CodecKind {
    /// Resolve a container MIME type (plus the `mpegversion` field for
    /// `video/mpeg`) to a codec.
    pub fn from_mime(mime: &str, mpeg_version: Option<i32>) -> Result<Self> {
        match (mime, mpeg_version) {
            ("video/x-h264", _) => Ok(CodecKind::H264),
            ("video/x-h263", _) => Ok(CodecKind::H263),
            ("video/x-xvid", _) => Ok(CodecKind::Mpeg4),
            ("video/mpeg", Some(2)) => Ok(CodecKind::Mpeg2),
            ("video/mpeg", Some(4)) => Ok(CodecKind::Mpeg4),
            ("video/mpeg", Some(version)) => {
                Err(Error::UnsupportedCodec(format!("{mime} version {version}")))
            }
            _ => Err(Error::UnsupportedCodec(mime.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::H264 => "H.264",
            CodecKind::H263 => "H.263",
            CodecKind::Mpeg2 => "MPEG-2",
            CodecKind::Mpeg4 => "MPEG-4",
        }
    }

    /// H.264 is the only family delivered with length-prefixed framing.
    pub fn uses_start_codes(&self) -> bool {
        !matches!(self, CodecKind::H264)
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Stream geometry and frame rate as negotiated with the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps_num: 0,
            fps_den: 0,
        }
        .normalized()
    }

    pub fn with_frame_rate(mut self, num: u32, den: u32) -> Self {
        self.fps_num = num;
        self.fps_den = den;
        self.normalized()
    }

    /// Containers that do not declare a frame rate are treated as 30 fps.
    pub fn normalized(mut self) -> Self {
        if self.fps_num == 0 || self.fps_den == 0 {
            self.fps_num = 30;
            self.fps_den = 1;
        }
        self
    }

    /// Number of 16x16 macroblocks covering one frame.
    pub fn macroblocks(&self) -> u32 {
        self.width.div_ceil(16) * self.height.div_ceil(16)
    }
}
