//! The three jitter histograms, maintained incrementally per event.
//!
//! All indices are slot gaps (or slot phases), so one second corresponds
//! to `bin_rate` and every array has `bin_rate + 1` entries covering the
//! inclusive range [0, 1 s]:
//!
//! - **consecutive**: gap between each event and the previous distinct
//!   slot, weighted by that slot's occupancy. Events merged into one slot
//!   flush their units when the stream moves to a new slot, so the total
//!   mass stays `accepted - 1`.
//! - **all_pairs**: gap between each event and every retained prior event
//!   within the trailing second. Deliberate O(window) fan-out per event.
//! - **wrapped**: event phase within a repeating one-second cycle,
//!   ignoring absolute time.

use crate::engine::timeline::QuantizedTimeline;
use serde::{Deserialize, Serialize};

/// The three histogram arrays, equal length, updated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSet {
    consecutive: Vec<u64>,
    all_pairs: Vec<u64>,
    wrapped: Vec<u64>,
}

impl HistogramSet {
    /// Allocate zero-filled histograms of the given length.
    pub fn new(len: usize) -> Self {
        Self {
            consecutive: vec![0; len],
            all_pairs: vec![0; len],
            wrapped: vec![0; len],
        }
    }

    /// Common length of the three arrays.
    pub fn len(&self) -> usize {
        self.consecutive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consecutive.is_empty()
    }

    /// Consecutive-gap counts, indexed by slot gap.
    pub fn consecutive(&self) -> &[u64] {
        &self.consecutive
    }

    /// Windowed all-pairs gap counts, indexed by slot gap.
    pub fn all_pairs(&self) -> &[u64] {
        &self.all_pairs
    }

    /// One-second phase occupancy, indexed by slot phase.
    pub fn wrapped(&self) -> &[u64] {
        &self.wrapped
    }

    /// Apply one accepted event landing in `slot` against the timeline
    /// state *before* the event is committed.
    ///
    /// Does nothing on an empty timeline: the first event only seeds the
    /// timeline and produces no gaps or phase. The caller must commit
    /// `slot` to the timeline afterwards; monotonic input guarantees
    /// `slot` is at least the current maximum, which keeps every index
    /// below in bounds.
    pub fn observe(&mut self, timeline: &QuantizedTimeline, slot: u64, bin_rate: u32) {
        let span = u64::from(bin_rate); // one second, in slots
        let Some((prev_slot, prev_count)) = timeline.maximum() else {
            return;
        };

        let gap = slot - prev_slot;
        if gap > 0 && gap <= span {
            // Merged events flush their units at the slot transition.
            self.consecutive[gap as usize] += prev_count;
        }

        let low = slot.saturating_sub(span);
        for (other, count) in timeline.range_from(low) {
            self.all_pairs[(slot - other) as usize] += count;
        }

        self.wrapped[(slot % span) as usize] += 1;
    }
}
