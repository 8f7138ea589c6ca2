//! H.264 out-of-band configuration parsing.
//!
//! Containers deliver H.264 configuration either as an
//! `AVCDecoderConfigurationRecord` (`avcC` box) or, for transport-stream
//! style sources, as raw Annex-B parameter sets. Both are normalized into a
//! single start-code-prefixed blob that is written ahead of the first access
//! unit when the hardware is bootstrapped.
//!
//! # `avcC` layout
//!
//! | Field                  | Bits | Notes                      |
//! |------------------------|------|----------------------------|
//! | configuration version  | 8    | always 1                   |
//! | profile indication     | 8    |                            |
//! | profile compatibility  | 8    |                            |
//! | level indication       | 8    |                            |
//! | reserved               | 6    | `0b111111`                 |
//! | length size minus one  | 2    | NAL length field width - 1 |
//! | reserved               | 3    | `0b111`                    |
//! | SPS count              | 5    |                            |
//! | SPS length + data      | 16+N | repeated SPS count times   |
//! | PPS count              | 8    |                            |
//! | PPS length + data      | 16+M | repeated PPS count times   |

use tracing::debug;

use crate::error::ParamSetKind;
use crate::nal::START_CODE;
use crate::{Error, Result};

const AVCC_VERSION: u8 = 1;
const AVCC_MIN_LEN: usize = 11;
const MAX_PROFILE_IDC: u8 = 100;

/// Framing used by the in-band access units of an H.264 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Access units already carry start codes.
    AnnexB,
    /// Every NAL unit is preceded by a big-endian length field.
    LengthPrefixed { nal_length_size: usize },
}

/// Normalized H.264 parameter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub format: StreamFormat,
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub sps_count: usize,
    pub pps_count: usize,
    blob: Vec<u8>,
}

impl ParameterSet {
    /// Build a parameter set from container codec data.
    ///
    /// A leading zero byte marks Annex-B data, which is kept verbatim. Anything
    /// else must be an `avcC` record. The resulting blob never exceeds
    /// `capacity` bytes.
    pub fn parse(config: &[u8], capacity: usize) -> Result<Self> {
        let parsed = match config.first() {
            Some(0) => Self::from_annexb(config, capacity)?,
            _ => Self::from_avcc(config, capacity)?,
        };

        debug!(
            sps_count = parsed.sps_count,
            pps_count = parsed.pps_count,
            format = ?parsed.format,
            blob_len = parsed.blob.len(),
            "parsed H.264 parameter sets"
        );
        Ok(parsed)
    }

    fn from_annexb(config: &[u8], capacity: usize) -> Result<Self> {
        if config.len() > capacity {
            return Err(Error::BufferTooSmall {
                needed: config.len(),
                capacity,
            });
        }
        Ok(Self {
            format: StreamFormat::AnnexB,
            profile_idc: 0,
            profile_compatibility: 0,
            level_idc: 0,
            sps_count: 0,
            pps_count: 0,
            blob: config.to_vec(),
        })
    }

    fn from_avcc(config: &[u8], capacity: usize) -> Result<Self> {
        let version = config.first().copied().unwrap_or_default();
        if version != AVCC_VERSION || config.len() < AVCC_MIN_LEN {
            return Err(Error::MalformedConfig {
                version,
                len: config.len(),
            });
        }

        let profile_idc = config[1];
        let profile_compatibility = config[2];
        let level_idc = config[3];
        let nal_length_size = (config[4] & 0x03) as usize + 1;

        if profile_idc > MAX_PROFILE_IDC {
            return Err(Error::UnsupportedProfile(profile_idc));
        }

        let mut reader = UnitReader {
            config,
            pos: 5,
            blob: Vec::new(),
            capacity,
        };

        let sps_count = (reader.read_count(ParamSetKind::Sps)? & 0x1F) as usize;
        for _ in 0..sps_count {
            reader.copy_unit(ParamSetKind::Sps)?;
        }

        let pps_count = reader.read_count(ParamSetKind::Pps)? as usize;
        for _ in 0..pps_count {
            reader.copy_unit(ParamSetKind::Pps)?;
        }

        if sps_count == 0 || pps_count == 0 {
            return Err(Error::MissingParameterSet {
                sps: sps_count,
                pps: pps_count,
            });
        }

        Ok(Self {
            format: StreamFormat::LengthPrefixed { nal_length_size },
            profile_idc,
            profile_compatibility,
            level_idc,
            sps_count,
            pps_count,
            blob: reader.blob,
        })
    }

    /// Start-code-prefixed SPS and PPS units, in record order.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn nal_length_size(&self) -> Option<usize> {
        match self.format {
            StreamFormat::LengthPrefixed { nal_length_size } => Some(nal_length_size),
            StreamFormat::AnnexB => None,
        }
    }

    pub fn is_length_prefixed(&self) -> bool {
        matches!(self.format, StreamFormat::LengthPrefixed { .. })
    }
}

struct UnitReader<'a> {
    config: &'a [u8],
    pos: usize,
    blob: Vec<u8>,
    capacity: usize,
}

impl UnitReader<'_> {
    fn remaining(&self) -> usize {
        self.config.len().saturating_sub(self.pos)
    }

    fn read_count(&mut self, kind: ParamSetKind) -> Result<u8> {
        let count = *self
            .config
            .get(self.pos)
            .ok_or(Error::TruncatedParameterSet {
                kind,
                declared: 1,
                remaining: 0,
            })?;
        self.pos += 1;
        Ok(count)
    }

    fn copy_unit(&mut self, kind: ParamSetKind) -> Result<()> {
        let field = self
            .config
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| Error::TruncatedParameterSet {
                kind,
                declared: 2,
                remaining: self.remaining(),
            })?;
        let len = u16::from_be_bytes([field[0], field[1]]) as usize;
        self.pos += 2;

        let unit = self
            .config
            .get(self.pos..self.pos + len)
            .ok_or_else(|| Error::TruncatedParameterSet {
                kind,
                declared: len,
                remaining: self.remaining(),
            })?;

        let needed = self.blob.len() + START_CODE.len() + len;
        if needed > self.capacity {
            return Err(Error::BufferTooSmall {
                needed,
                capacity: self.capacity,
            });
        }
        self.blob.extend_from_slice(&START_CODE);
        self.blob.extend_from_slice(unit);
        self.pos += len;
        Ok(())
    }
}
