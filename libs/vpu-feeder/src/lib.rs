//! Input feeder for stateful hardware video decoders.
//!
//! This crate prepares container-delivered compressed frames for a hardware
//! decoding engine and reconciles what comes back:
//!
//! - H.264 `avcC` records are turned into start-code-prefixed parameter sets
//!   ([`ParameterSet`]) and length-prefixed access units are rewritten as
//!   Annex-B ([`reframe_access_unit`]).
//! - Presentation times are matched to decoded pictures with an
//!   earliest-timestamp-wins ledger ([`TimestampLedger`]), since the hardware
//!   may reorder output.
//! - Submission is throttled to the number of output buffers the hardware owns
//!   ([`CreditGate`]).
//!
//! [`VideoDecoder`] ties these together for one stream. The hardware itself is
//! reached through the [`VpuDriver`] and [`VpuDevice`] traits.

mod avcc;
mod codec;
mod config;
mod credit;
mod device;
mod error;
mod ledger;
pub mod nal;
mod reframe;
mod session;

pub use avcc::{ParameterSet, StreamFormat};
pub use codec::{CodecKind, StreamInfo};
pub use config::DecoderConfig;
pub use credit::CreditGate;
pub use device::{DecodeInput, DecodeOutput, OutputSettings, StreamConfig, VpuDevice, VpuDriver};
pub use error::{DeviceError, Error, ParamSetKind, Result};
pub use ledger::{FrameFlags, PendingTimestamp, TimestampLedger};
pub use reframe::{ReframeBuffer, Reframed, reframe_access_unit};
pub use session::{
    DisplayFrame, DisplayReleaser, FrameOutcome, InputFrame, SessionState, SessionStats,
    VideoDecoder,
};
