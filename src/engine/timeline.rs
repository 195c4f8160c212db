//! Ordered slot-occupancy timeline backing incremental diff computation.
//!
//! The timeline is a compressed view of the accepted event stream: one
//! entry per distinct quantized slot, carrying how many events landed
//! there. Because raw input is monotonic, new slots only ever arrive at
//! the high end, so insertion either bumps the current maximum or appends
//! past it. Entries are retained for the lifetime of the timeline; the
//! trailing-window scan bounds its own range instead of relying on
//! eviction.

use std::collections::BTreeMap;

/// Ordered mapping from quantized slot index to occurrence count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantizedTimeline {
    slots: BTreeMap<u64, u64>,
}

impl QuantizedTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of distinct slots ever observed.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// The highest slot and its occupancy, if any events were recorded.
    pub fn maximum(&self) -> Option<(u64, u64)> {
        self.slots.iter().next_back().map(|(k, v)| (*k, *v))
    }

    /// Occupancy of one slot (zero if never hit).
    pub fn count_at(&self, slot: u64) -> u64 {
        self.slots.get(&slot).copied().unwrap_or(0)
    }

    /// Record one event in `slot`.
    ///
    /// With monotonic input a repeated slot can only be the current
    /// maximum, so this either bumps that entry or appends a new one.
    pub fn insert_or_bump(&mut self, slot: u64) {
        *self.slots.entry(slot).or_insert(0) += 1;
    }

    /// Ascending `(slot, count)` pairs with `slot >= low`, up to and
    /// including the current maximum.
    pub fn range_from(&self, low: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.slots.range(low..).map(|(k, v)| (*k, *v))
    }
}
