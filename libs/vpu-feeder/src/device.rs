//! Boundary with the hardware decoding engine.
//!
//! The feeder never talks to a driver directly; it drives any [`VpuDriver`]
//! implementation. Methods take `&self` because the display thread returns
//! buffers through a shared handle while the submission thread decodes.

use crate::codec::CodecKind;
use crate::error::DeviceError;

/// Stream properties reported by the hardware after parsing the sequence
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Minimum number of output buffers the stream needs.
    pub min_buffers: u32,
    /// FourCC of the picture layout the hardware will produce.
    pub pixel_format: u32,
}

/// Output pool layout requested when the hardware is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSettings {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub plane_count: u32,
    pub pixel_format: u32,
}

/// One bitstream chunk handed to the hardware.
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    pub data: &'a [u8],
    pub timestamp: i64,
    pub end_of_stream: bool,
}

/// What the hardware produced for one decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOutput {
    /// Output buffer holding a displayable picture, if any.
    pub display_index: Option<usize>,
    /// Output buffer the hardware decoded into, which may still be
    /// waiting on reordering.
    pub decoded_index: Option<usize>,
}

/// An open hardware decoder instance.
pub trait VpuDevice: Send + Sync {
    /// Parse the sequence header in `config` and report the stream layout.
    fn query_stream_config(
        &self,
        width: u32,
        height: u32,
        config: &[u8],
    ) -> Result<StreamConfig, DeviceError>;

    /// Allocate the output pool and start the decoder.
    fn configure(&self, settings: &OutputSettings) -> Result<(), DeviceError>;

    fn decode_frame(&self, input: &DecodeInput<'_>) -> Result<DecodeOutput, DeviceError>;

    /// Mark a displayed output buffer as free for reuse.
    fn clear_display_flag(&self, buffer_index: usize);

    /// Drop all queued input and pending output.
    fn flush(&self) -> Result<(), DeviceError>;

    fn close(&self);
}

/// Opens hardware decoder instances.
pub trait VpuDriver {
    type Device: VpuDevice;

    fn open(&self, codec: CodecKind) -> Result<Self::Device, DeviceError>;
}
