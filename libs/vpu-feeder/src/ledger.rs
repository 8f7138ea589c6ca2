use bitflags::bitflags;
use tracing::{trace, warn};

use crate::{Error, Result};

bitflags! {
    /// Per-buffer flags supplied by the container alongside each access unit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        const DISCONT = 1 << 6;
        const RESYNC = 1 << 7;
        const CORRUPTED = 1 << 8;
        const MARKER = 1 << 9;
        const HEADER = 1 << 10;
        const GAP = 1 << 11;
        const DROPPABLE = 1 << 12;
        /// Not a sync point; absent on key frames.
        const DELTA_UNIT = 1 << 13;
        const DECODE_ONLY = 1 << 15;
    }
}

/// A presentation time waiting to be matched with a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimestamp {
    pub timestamp: i64,
    pub flags: FrameFlags,
}

/// Fixed-capacity set of in-flight presentation times.
///
/// Hardware may emit pictures out of submission order, so outputs are matched
/// to the smallest pending timestamp rather than to the oldest submission.
/// This relies on presentation order being non-decreasing across the stream.
#[derive(Debug)]
pub struct TimestampLedger {
    slots: Box<[Option<PendingTimestamp>]>,
    dropped: u64,
}

impl TimestampLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            dropped: 0,
        }
    }

    /// Store a timestamp in the first free slot.
    ///
    /// `None` is a no-op. When every slot is occupied the new entry is
    /// dropped and `LedgerFull` is returned; pending entries are untouched.
    pub fn record(&mut self, timestamp: Option<i64>, flags: FrameFlags) -> Result<()> {
        let Some(timestamp) = timestamp else {
            return Ok(());
        };

        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(PendingTimestamp { timestamp, flags });
                trace!(timestamp, pending = self.len(), "recorded timestamp");
                Ok(())
            }
            None => {
                self.dropped += 1;
                warn!(
                    timestamp,
                    capacity = self.slots.len(),
                    dropped = self.dropped,
                    "timestamp ledger full, dropping timestamp"
                );
                Err(Error::LedgerFull {
                    capacity: self.slots.len(),
                })
            }
        }
    }

    /// Remove and return the earliest pending timestamp.
    ///
    /// Ties resolve to the lowest slot index.
    pub fn consume(&mut self) -> Result<PendingTimestamp> {
        let mut earliest: Option<(usize, i64)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(pending) = slot {
                if earliest.is_none_or(|(_, ts)| pending.timestamp < ts) {
                    earliest = Some((idx, pending.timestamp));
                }
            }
        }

        let (idx, _) = earliest.ok_or(Error::NoTimestampAvailable)?;
        self.slots[idx].take().ok_or(Error::NoTimestampAvailable)
    }

    /// Empty every slot.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Timestamps discarded because the ledger was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
