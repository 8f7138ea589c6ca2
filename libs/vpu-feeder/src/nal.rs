//! H.264 NAL unit helpers shared by the parameter-set extractor and the
//! stream reframer.

/// Annex-B 4-byte start code emitted in front of every NAL unit.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL unit types the feeder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    /// Non-IDR slice
    Slice,
    /// Instantaneous Decoder Refresh
    Idr,
    /// Sequence Parameter Set
    Sps,
    /// Picture Parameter Set
    Pps,
    Other(u8),
}

impl From<u8> for NalType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => NalType::Slice,
            5 => NalType::Idr,
            7 => NalType::Sps,
            8 => NalType::Pps,
            other => NalType::Other(other),
        }
    }
}

impl NalType {
    /// Type of the NAL unit starting at `nal[0]`, if any.
    pub fn of(nal: &[u8]) -> Option<Self> {
        nal.first().copied().map(NalType::from)
    }
}

/// Read a big-endian length field of `width` (1-4) bytes.
///
/// Returns `None` when `buf` is shorter than the field.
pub fn read_length(buf: &[u8], width: usize) -> Option<usize> {
    let field = buf.get(..width)?;
    Some(
        field
            .iter()
            .fold(0usize, |len, &byte| (len << 8) | byte as usize),
    )
}

/// Locate the next 3- or 4-byte start code at or after `from`.
///
/// Returns the offset of the start code and its length.
pub fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if data[i + 2] == 0 && data.get(i + 3) == Some(&1) {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Iterates the NAL payloads of an Annex-B byte stream, start codes stripped.
pub struct AnnexBNalIter<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> AnnexBNalIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }
}

impl<'a> Iterator for AnnexBNalIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (pos, len) = find_start_code(self.data, self.cursor)?;
        let start = pos + len;
        let end = find_start_code(self.data, start)
            .map(|(next, _)| next)
            .unwrap_or(self.data.len());
        self.cursor = end;
        Some(&self.data[start..end])
    }
}

/// True if any NAL unit of an Annex-B access unit is an IDR slice.
pub fn annexb_contains_idr(data: &[u8]) -> bool {
    AnnexBNalIter::new(data).any(|nal| NalType::of(nal) == Some(NalType::Idr))
}
