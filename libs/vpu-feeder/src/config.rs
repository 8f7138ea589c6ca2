use std::time::Duration;

use crate::codec::{CodecKind, StreamInfo};

/// Macroblock count of a 1280x720 frame. H.264 streams larger than this get
/// the bigger output pool.
const HD_MACROBLOCKS: u32 = (1280 >> 4) * (720 >> 4);

/// Session limits and hardware pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Capacity of the scratch buffer holding one hardware-ready frame.
    pub input_buffer_size: usize,
    /// Upper bound on parameter-set and extra-data blobs.
    pub parameter_set_capacity: usize,
    /// Number of frames whose timestamps can be in flight at once.
    pub ledger_capacity: usize,
    pub h264_buffers_sd: u32,
    pub h264_buffers_hd: u32,
    pub default_buffers: u32,
    pub plane_count: u32,
    /// Bound on how long a submission waits for a free output buffer.
    /// `None` waits indefinitely.
    pub credit_timeout: Option<Duration>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1088,
            input_buffer_size: 4 * 1024 * 1024,
            parameter_set_capacity: 4096,
            ledger_capacity: 32,
            h264_buffers_sd: 10,
            h264_buffers_hd: 14,
            default_buffers: 12,
            plane_count: 3,
            credit_timeout: None,
        }
    }
}

impl DecoderConfig {
    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    pub fn with_input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    pub fn with_parameter_set_capacity(mut self, capacity: usize) -> Self {
        self.parameter_set_capacity = capacity;
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    pub fn with_output_buffers(mut self, h264_sd: u32, h264_hd: u32, default: u32) -> Self {
        self.h264_buffers_sd = h264_sd;
        self.h264_buffers_hd = h264_hd;
        self.default_buffers = default;
        self
    }

    pub fn with_plane_count(mut self, planes: u32) -> Self {
        self.plane_count = planes;
        self
    }

    pub fn with_credit_timeout(mut self, timeout: Duration) -> Self {
        self.credit_timeout = Some(timeout);
        self
    }

    /// Number of output buffers to request from the hardware.
    pub fn output_buffers(&self, codec: CodecKind, info: &StreamInfo) -> u32 {
        match codec {
            CodecKind::H264 if info.macroblocks() <= HD_MACROBLOCKS => self.h264_buffers_sd,
            CodecKind::H264 => self.h264_buffers_hd,
            CodecKind::H263 | CodecKind::Mpeg2 | CodecKind::Mpeg4 => self.default_buffers,
        }
    }

    pub fn within_limits(&self, info: &StreamInfo) -> bool {
        info.width <= self.max_width && info.height <= self.max_height
    }
}
