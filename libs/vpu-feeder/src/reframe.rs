//! Conversion of length-prefixed H.264 access units into the Annex-B byte
//! stream the hardware parses, written into a bounded scratch buffer.

use crate::nal::{self, NalType, START_CODE};
use crate::{Error, Result};

/// Reusable fixed-capacity byte buffer holding one hardware-ready frame.
///
/// Every write is checked against the capacity chosen at construction; the
/// backing storage is allocated once and reused across frames.
#[derive(Debug)]
pub struct ReframeBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl ReframeBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append `data`, failing without writing anything if it does not fit.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.buf.len() + data.len();
        if needed > self.capacity {
            return Err(Error::BufferTooSmall {
                needed,
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Release the backing allocation.
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }
}

/// Result of reframing one access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reframed {
    /// Bytes appended to the destination buffer.
    pub written: usize,
    /// Number of NAL units emitted.
    pub nal_count: usize,
    /// At least one NAL unit was an IDR slice.
    pub keyframe: bool,
}

/// Rewrite a length-prefixed access unit as start-code-prefixed NAL units,
/// appending to `out`.
///
/// `nal_length_size` is the width of the length fields (1-4 bytes). The first
/// unit is always parsed. After it, fewer than three trailing bytes are
/// treated as padding and ignored.
pub fn reframe_access_unit(
    access_unit: &[u8],
    nal_length_size: usize,
    out: &mut ReframeBuffer,
) -> Result<Reframed> {
    debug_assert!((1..=4).contains(&nal_length_size));

    let start_len = out.len();
    let mut rest = access_unit;
    let mut nal_count = 0;
    let mut keyframe = false;

    loop {
        let length = nal::read_length(rest, nal_length_size).ok_or_else(|| {
            Error::InvalidNalLength {
                length: 0,
                remaining: rest.len(),
            }
        })?;
        rest = &rest[nal_length_size..];

        if length == 0 || length > rest.len() {
            return Err(Error::InvalidNalLength {
                length,
                remaining: rest.len(),
            });
        }

        let (unit, tail) = rest.split_at(length);
        out.extend(&START_CODE)?;
        out.extend(unit)?;

        if NalType::of(unit) == Some(NalType::Idr) {
            keyframe = true;
        }
        nal_count += 1;
        rest = tail;
        if rest.len() <= 2 {
            break;
        }
    }

    Ok(Reframed {
        written: out.len() - start_len,
        nal_count,
        keyframe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_prefixed(width: usize, units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            let len = (unit.len() as u32).to_be_bytes();
            out.extend_from_slice(&len[4 - width..]);
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn test_reframe_single_idr() {
        let mut idr = vec![0x65];
        idr.resize(20, 0x88);
        let au = length_prefixed(4, &[&idr]);

        let mut out = ReframeBuffer::new(1024);
        let reframed = reframe_access_unit(&au, 4, &mut out).unwrap();

        assert_eq!(reframed.written, 24);
        assert_eq!(reframed.nal_count, 1);
        assert!(reframed.keyframe);
        assert_eq!(&out.as_slice()[..4], &START_CODE);
        assert_eq!(&out.as_slice()[4..], idr.as_slice());
    }

    #[test]
    fn test_reframe_preserves_order_for_each_width() {
        let sei: &[u8] = &[0x06, 0x05, 0x01, 0x80];
        let slice: &[u8] = &[0x41, 0x9a, 0x02, 0x03, 0x04];
        for width in 1..=4 {
            let au = length_prefixed(width, &[sei, slice]);
            let mut out = ReframeBuffer::new(1024);
            let reframed = reframe_access_unit(&au, width, &mut out).unwrap();

            assert_eq!(reframed.nal_count, 2);
            assert!(!reframed.keyframe);

            let mut expected = START_CODE.to_vec();
            expected.extend_from_slice(sei);
            expected.extend_from_slice(&START_CODE);
            expected.extend_from_slice(slice);
            assert_eq!(out.as_slice(), expected.as_slice());
        }
    }

    #[test]
    fn test_reframe_appends_after_existing_data() {
        let mut out = ReframeBuffer::new(64);
        out.extend(&[0, 0, 0, 1, 0x67, 0x42]).unwrap();

        let au = length_prefixed(2, &[&[0x65, 0x01, 0x02]]);
        let reframed = reframe_access_unit(&au, 2, &mut out).unwrap();

        assert_eq!(reframed.written, 7);
        assert_eq!(out.len(), 13);
    }

    #[test]
    fn test_reframe_ignores_trailing_padding() {
        let mut au = length_prefixed(4, &[&[0x41, 0x01, 0x02]]);
        au.extend_from_slice(&[0x00, 0x00]);
        let mut out = ReframeBuffer::new(64);
        let reframed = reframe_access_unit(&au, 4, &mut out).unwrap();
        assert_eq!(reframed.nal_count, 1);
        assert_eq!(reframed.written, 7);
    }

    #[test]
    fn test_reframe_two_byte_access_unit() {
        // 1-byte length field carrying a lone access unit delimiter
        let mut out = ReframeBuffer::new(64);
        let reframed = reframe_access_unit(&[0x01, 0x09], 1, &mut out).unwrap();
        assert_eq!(
            reframed,
            Reframed {
                written: 5,
                nal_count: 1,
                keyframe: false,
            }
        );
        assert_eq!(out.as_slice(), &[0, 0, 0, 1, 0x09]);
    }

    #[test]
    fn test_reframe_rejects_empty_access_unit() {
        let mut out = ReframeBuffer::new(64);
        assert_eq!(
            reframe_access_unit(&[], 2, &mut out),
            Err(Error::InvalidNalLength {
                length: 0,
                remaining: 0
            })
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_reframe_rejects_zero_length() {
        let au = [0x00, 0x00, 0x00, 0x00, 0x65, 0x01];
        let mut out = ReframeBuffer::new(64);
        assert_eq!(
            reframe_access_unit(&au, 4, &mut out),
            Err(Error::InvalidNalLength {
                length: 0,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_reframe_rejects_overlong_length() {
        let au = [0x00, 0x00, 0x00, 0x10, 0x65, 0x01, 0x02];
        let mut out = ReframeBuffer::new(64);
        assert_eq!(
            reframe_access_unit(&au, 4, &mut out),
            Err(Error::InvalidNalLength {
                length: 16,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_reframe_rejects_truncated_length_field() {
        let au = [0x00, 0x00, 0x00];
        let mut out = ReframeBuffer::new(64);
        assert!(matches!(
            reframe_access_unit(&au, 4, &mut out),
            Err(Error::InvalidNalLength { remaining: 3, .. })
        ));
    }

    #[test]
    fn test_reframe_buffer_too_small() {
        let au = length_prefixed(4, &[&[0x65; 32]]);
        let mut out = ReframeBuffer::new(16);
        assert_eq!(
            reframe_access_unit(&au, 4, &mut out),
            Err(Error::BufferTooSmall {
                needed: 36,
                capacity: 16
            })
        );
    }

    #[test]
    fn test_reframe_buffer_extend_is_all_or_nothing() {
        let mut buf = ReframeBuffer::new(4);
        buf.extend(&[1, 2, 3]).unwrap();
        assert!(buf.extend(&[4, 5]).is_err());
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
