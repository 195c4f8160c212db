//! Analyzer facade.
//!
//! Owns the quantized timeline, the three histograms, and the spectral
//! engine, and keeps them consistent under one ingestion path. Raw
//! timestamps are retained so the whole state can be rebuilt
//! deterministically when the bin rate changes.

use crate::engine::bins::BinConfig;
use crate::engine::histograms::HistogramSet;
use crate::engine::spectral::{RoundInput, SpectralEngine, SpectrumSet};
use crate::engine::timeline::QuantizedTimeline;
use serde::{Deserialize, Serialize};
use std::mem;
use std::time::Duration;
use tracing::{debug, info};

/// Incremental keystroke-timing analyzer.
pub struct Analyzer {
    config: BinConfig,
    raw_log: Vec<u64>,
    last_raw: Option<u64>,
    timeline: QuantizedTimeline,
    histograms: HistogramSet,
    spectral: SpectralEngine,
    rejected: u64,
}

/// Point-in-time copy of everything a caller can observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSnapshot {
    pub bin_rate: u32,
    pub interval_us: f64,
    pub accepted: u64,
    pub rejected: u64,
    pub distinct_bins: usize,
    pub calculating: bool,
    pub histograms: HistogramSet,
    pub spectra: SpectrumSet,
}

impl Analyzer {
    /// Analyzer at the default bin rate.
    pub fn new() -> Self {
        Self::from_config(BinConfig::default())
    }

    /// Analyzer at the given bin rate, or `None` if the rate is invalid.
    pub fn with_bin_rate(bin_rate: u32) -> Option<Self> {
        BinConfig::try_new(bin_rate).map(Self::from_config)
    }

    fn from_config(config: BinConfig) -> Self {
        Self {
            raw_log: Vec::new(),
            last_raw: None,
            timeline: QuantizedTimeline::new(),
            histograms: HistogramSet::new(config.histogram_len()),
            spectral: SpectralEngine::new(config.spectrum_len()),
            rejected: 0,
            config,
        }
    }

    /// Ingest a batch of event timestamps in microseconds.
    ///
    /// Timestamps older than the newest accepted one are rejected;
    /// equal timestamps are accepted. Any non-empty batch queues a
    /// spectral round over the resulting histogram state.
    pub fn add(&mut self, timestamps: &[u64]) {
        if timestamps.is_empty() {
            return;
        }
        for &t in timestamps {
            if self.last_raw.is_some_and(|last| t < last) {
                self.rejected += 1;
                debug!(timestamp = t, "rejected out-of-order timestamp");
                continue;
            }
            let slot = self.config.slot_of(t);
            self.histograms
                .observe(&self.timeline, slot, self.config.bin_rate());
            self.timeline.insert_or_bump(slot);
            self.last_raw = Some(t);
            self.raw_log.push(t);
        }
        self.spectral
            .submit(RoundInput::from_histograms(&self.histograms));
    }

    /// Discard all state, keeping the configured bin rate.
    pub fn reset(&mut self) {
        self.raw_log.clear();
        self.last_raw = None;
        self.timeline.clear();
        self.histograms = HistogramSet::new(self.config.histogram_len());
        self.rejected = 0;
        self.spectral.reset(self.config.spectrum_len());
    }

    /// Switch to a new bin rate and rebuild state by replaying every
    /// previously accepted timestamp. Returns false and changes nothing
    /// if the candidate rate is invalid.
    pub fn set_bin_rate(&mut self, candidate: u32) -> bool {
        let Some(config) = BinConfig::try_new(candidate) else {
            return false;
        };
        let raw = mem::take(&mut self.raw_log);
        self.config = config;
        self.reset();
        info!(bin_rate = candidate, events = raw.len(), "rebinning retained events");
        self.add(&raw);
        true
    }

    pub fn bin_rate(&self) -> u32 {
        self.config.bin_rate()
    }

    /// Bin width in microseconds.
    pub fn interval(&self) -> f64 {
        self.config.interval()
    }

    pub fn histograms(&self) -> &HistogramSet {
        &self.histograms
    }

    /// Copy of the most recently published spectra.
    pub fn spectra(&self) -> SpectrumSet {
        self.spectral.spectra()
    }

    /// True while spectral rounds are queued or in flight.
    pub fn calculating(&self) -> bool {
        self.spectral.calculating()
    }

    /// Block until the spectral engine is idle. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.spectral.wait_idle(timeout)
    }

    /// Every accepted timestamp, in ingestion order.
    pub fn raw_log(&self) -> &[u64] {
        &self.raw_log
    }

    pub fn accepted(&self) -> u64 {
        self.raw_log.len() as u64
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Number of occupied timeline slots.
    pub fn distinct_bins(&self) -> usize {
        self.timeline.len()
    }

    pub fn snapshot(&self) -> AnalyzerSnapshot {
        AnalyzerSnapshot {
            bin_rate: self.config.bin_rate(),
            interval_us: self.config.interval(),
            accepted: self.accepted(),
            rejected: self.rejected,
            distinct_bins: self.timeline.len(),
            calculating: self.calculating(),
            histograms: self.histograms.clone(),
            spectra: self.spectral.spectra(),
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(hist: &[u64]) -> u64 {
        hist.iter().sum()
    }

    #[test]
    fn test_rejects_out_of_order_accepts_equal() {
        let mut analyzer = Analyzer::new();
        analyzer.add(&[100, 50, 100, 200]);
        assert_eq!(analyzer.accepted(), 3);
        assert_eq!(analyzer.rejected(), 1);
        assert_eq!(analyzer.raw_log(), &[100, 100, 200]);
    }

    #[test]
    fn test_first_event_only_seeds_timeline() {
        let mut analyzer = Analyzer::new();
        analyzer.add(&[500]);
        assert_eq!(analyzer.accepted(), 1);
        assert_eq!(analyzer.distinct_bins(), 1);
        assert_eq!(sum(analyzer.histograms().consecutive()), 0);
        assert_eq!(sum(analyzer.histograms().all_pairs()), 0);
        assert_eq!(sum(analyzer.histograms().wrapped()), 0);
    }

    #[test]
    fn test_consecutive_mass_tracks_accepted_events() {
        let mut analyzer = Analyzer::new();
        let timestamps: Vec<u64> = (0..10).map(|i| i * 7_000).collect();
        analyzer.add(&timestamps);
        assert_eq!(sum(analyzer.histograms().consecutive()), 9);
        assert_eq!(sum(analyzer.histograms().wrapped()), 9);
    }

    #[test]
    fn test_set_bin_rate_rejects_invalid_rate() {
        let mut analyzer = Analyzer::with_bin_rate(1_000).expect("valid rate");
        analyzer.add(&[0, 1_000, 2_500]);
        assert!(!analyzer.set_bin_rate(1_001));
        assert_eq!(analyzer.bin_rate(), 1_000);
        assert_eq!(analyzer.accepted(), 3);
    }

    #[test]
    fn test_set_bin_rate_replays_raw_log() {
        let mut analyzer = Analyzer::with_bin_rate(1_000).expect("valid rate");
        analyzer.add(&[0, 1_000, 2_500]);
        let before = analyzer.histograms().clone();

        assert!(analyzer.set_bin_rate(2_000));
        assert_eq!(analyzer.bin_rate(), 2_000);
        assert_eq!(analyzer.accepted(), 3);
        assert_eq!(analyzer.histograms().len(), 2_001);
        // 500us bins put the events in slots 0, 2 and 5.
        assert_eq!(analyzer.histograms().consecutive()[2], 1);
        assert_eq!(analyzer.histograms().consecutive()[3], 1);

        // Replaying back at the original rate restores the original state.
        assert!(analyzer.set_bin_rate(1_000));
        assert_eq!(analyzer.histograms(), &before);
    }

    #[test]
    fn test_reset_clears_state_and_spectra() {
        let mut analyzer = Analyzer::with_bin_rate(125).expect("valid rate");
        analyzer.add(&[0, 10_000, 20_000]);
        assert!(analyzer.wait_idle(Duration::from_secs(5)));

        analyzer.reset();
        assert_eq!(analyzer.accepted(), 0);
        assert_eq!(analyzer.rejected(), 0);
        assert_eq!(analyzer.distinct_bins(), 0);
        assert_eq!(sum(analyzer.histograms().all_pairs()), 0);
        let spectra = analyzer.spectra();
        assert_eq!(spectra.consecutive.len(), 63);
        assert!(spectra.consecutive.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_snapshot_reflects_counts() {
        let mut analyzer = Analyzer::with_bin_rate(1_000).expect("valid rate");
        analyzer.add(&[5_000, 1_000, 6_000]);
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.bin_rate, 1_000);
        assert_eq!(snapshot.interval_us, 1_000.0);
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.distinct_bins, 2);
    }
}
