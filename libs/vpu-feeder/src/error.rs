use thiserror::Error;

use crate::codec::CodecKind;

/// Status code reported by the hardware decoder driver.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("device error {0}")]
pub struct DeviceError(pub i32);

/// Which parameter-set list of an `avcC` record a length field belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSetKind {
    Sps,
    Pps,
}

impl std::fmt::Display for ParamSetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamSetKind::Sps => f.write_str("SPS"),
            ParamSetKind::Pps => f.write_str("PPS"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed avcC record ({len} bytes, version {version})")]
    MalformedConfig { version: u8, len: usize },
    #[error("unsupported H.264 profile {0}")]
    UnsupportedProfile(u8),
    #[error("{kind} declares {declared} bytes but only {remaining} remain")]
    TruncatedParameterSet {
        kind: ParamSetKind,
        declared: usize,
        remaining: usize,
    },
    #[error("avcC record has {sps} SPS and {pps} PPS units")]
    MissingParameterSet { sps: usize, pps: usize },
    #[error("invalid NAL length {length} with {remaining} bytes remaining")]
    InvalidNalLength { length: usize, remaining: usize },
    #[error("buffer too small: need {needed} bytes, capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("codec data needs {needed} bytes, capacity is {capacity}")]
    CodecDataTooLarge { needed: usize, capacity: usize },
    #[error("failed to open {codec} decoder: {source}")]
    DeviceOpenFailed {
        codec: CodecKind,
        #[source]
        source: DeviceError,
    },
    #[error("hardware bootstrap failed: {0}")]
    BootstrapFailed(#[source] DeviceError),
    #[error("resolution {width}x{height} exceeds {max_width}x{max_height}")]
    ResolutionOutOfRange {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("no timestamp available")]
    NoTimestampAvailable,
    #[error("timestamp ledger full ({capacity} slots)")]
    LedgerFull { capacity: usize },
    #[error("timed out waiting for an output buffer")]
    CreditTimeout,
    #[error("wait for an output buffer was cancelled")]
    Cancelled,
    #[error("frame decode failed: {0}")]
    Decode(#[source] DeviceError),
    #[error("decoder session is closed")]
    Closed,
    #[error("unsupported codec {0}")]
    UnsupportedCodec(String),
}

impl Error {
    /// Returns true if the session cannot be used after this error.
    ///
    /// Codec-data and bootstrap failures leave the hardware unconfigured, and a
    /// cancelled credit wait means the session is shutting down. Everything
    /// else is scoped to one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedConfig { .. }
                | Error::UnsupportedProfile(_)
                | Error::TruncatedParameterSet { .. }
                | Error::MissingParameterSet { .. }
                | Error::CodecDataTooLarge { .. }
                | Error::DeviceOpenFailed { .. }
                | Error::BootstrapFailed(_)
                | Error::ResolutionOutOfRange { .. }
                | Error::Cancelled
                | Error::Closed
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
