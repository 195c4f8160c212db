//! Bin-rate validation and quantization-interval derivation.
//!
//! The bin rate is the number of quantization slots per second. Valid rates
//! are positive multiples of 125 whose quotient by 125 is a power of two
//! (125, 250, ..., 8000, 16000, ...). That restriction keeps the slot
//! interval `1_000_000 / bin_rate` a power-of-two fraction of 8000, which
//! is exactly representable in an `f64`, so quantization never drifts: the
//! same timestamp always lands in the same slot, on first ingestion and on
//! replay alike.

use serde::{Deserialize, Serialize};

/// One second expressed in microseconds.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Default bin rate: 16000 slots per second (62.5 us resolution).
pub const DEFAULT_BIN_RATE: u32 = 16_000;

/// Check whether a candidate bin rate is acceptable.
pub fn is_valid_bin_rate(candidate: u32) -> bool {
    candidate > 0 && candidate % 125 == 0 && (candidate / 125).is_power_of_two()
}

/// A validated bin rate together with its derived slot interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinConfig {
    bin_rate: u32,
    interval: f64,
}

impl BinConfig {
    /// Build a configuration from a candidate rate.
    ///
    /// Returns `None` for invalid candidates so callers can treat a bad
    /// rate as a no-op without an error path.
    pub fn try_new(bin_rate: u32) -> Option<Self> {
        if !is_valid_bin_rate(bin_rate) {
            return None;
        }
        Some(Self {
            bin_rate,
            interval: MICROS_PER_SEC as f64 / bin_rate as f64,
        })
    }

    /// Slots per second.
    pub fn bin_rate(&self) -> u32 {
        self.bin_rate
    }

    /// Slot width in microseconds. Exact by construction.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Quantize a raw microsecond timestamp to its slot index.
    pub fn slot_of(&self, timestamp_us: u64) -> u64 {
        (timestamp_us as f64 / self.interval).round() as u64
    }

    /// Quantized microsecond value of a slot index.
    pub fn micros_of(&self, slot: u64) -> f64 {
        slot as f64 * self.interval
    }

    /// Histogram length: slot gaps covering [0, 1 s] inclusive.
    pub fn histogram_len(&self) -> usize {
        self.bin_rate as usize + 1
    }

    /// Magnitude-spectrum length: the non-redundant half of a real-input
    /// FFT over a histogram-length signal.
    pub fn spectrum_len(&self) -> usize {
        (self.histogram_len() + 1) / 2
    }
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            bin_rate: DEFAULT_BIN_RATE,
            interval: MICROS_PER_SEC as f64 / DEFAULT_BIN_RATE as f64,
        }
    }
}
