//! Jitter report documents.
//!
//! A report captures one analyzed recording: where it came from, how
//! it was binned, gap statistics, spectral peaks, and the full
//! histogram and spectrum arrays for downstream tooling.

use crate::engine::{Analyzer, HistogramSet, SpectrumSet};
use crate::parser::Recording;
use crate::stats::{gap_summary, low_cut, top_peaks, GapSummary, SpectralPeak};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The current report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "keyjitter";

/// Producer metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Where the analyzed data came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSource {
    pub path: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Recording start time (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_utc: Option<String>,
    pub device_count: usize,
    pub event_count: usize,
    pub press_count: usize,
}

/// Spectral peaks per histogram, low-cut applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPeaks {
    pub consecutive: Vec<SpectralPeak>,
    pub all_pairs: Vec<SpectralPeak>,
    pub wrapped: Vec<SpectralPeak>,
}

/// Analysis results and engine counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub bin_rate: u32,
    pub interval_us: f64,
    pub accepted_events: u64,
    pub rejected_events: u64,
    pub distinct_bins: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_summary: Option<GapSummary>,
    pub peaks: ReportPeaks,
}

/// One analyzed recording as a self-contained document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterReport {
    /// Report schema version (currently "1.0")
    pub report_version: String,
    /// When this report was generated (RFC3339)
    pub generated_at_utc: String,
    pub producer: ReportProducer,
    pub source: ReportSource,
    pub analysis: ReportAnalysis,
    pub histograms: HistogramSet,
    pub spectra: SpectrumSet,
}

/// Builder for report documents.
pub struct ReportBuilder {
    instance_id: Uuid,
}

impl ReportBuilder {
    /// Create a new builder with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }

    /// Get the instance ID.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Build a report from a parsed recording and the analyzer state it
    /// was fed into. `peak_count` caps the peaks listed per spectrum.
    pub fn build(
        &self,
        path: &Path,
        recording: &Recording,
        analyzer: &Analyzer,
        peak_count: usize,
    ) -> JitterReport {
        let bin_rate = analyzer.bin_rate();
        let spectra = analyzer.spectra();
        let peaks = ReportPeaks {
            consecutive: peaks_of(&spectra.consecutive, bin_rate, peak_count),
            all_pairs: peaks_of(&spectra.all_pairs, bin_rate, peak_count),
            wrapped: peaks_of(&spectra.wrapped, bin_rate, peak_count),
        };

        JitterReport {
            report_version: REPORT_VERSION.to_string(),
            generated_at_utc: Utc::now().to_rfc3339(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id.to_string(),
                hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
            },
            source: ReportSource {
                path: path.display().to_string(),
                format: recording.meta.format.to_string(),
                title: recording.meta.title.clone(),
                creator: recording.meta.creator.clone(),
                system: recording.meta.system.clone(),
                started_at_utc: recording.meta.started_at.map(|t| t.to_rfc3339()),
                device_count: recording.devices.len(),
                event_count: recording.events.len(),
                press_count: recording.press_count(),
            },
            analysis: ReportAnalysis {
                bin_rate,
                interval_us: analyzer.interval(),
                accepted_events: analyzer.accepted(),
                rejected_events: analyzer.rejected(),
                distinct_bins: analyzer.distinct_bins(),
                gap_summary: gap_summary(analyzer.raw_log()),
                peaks,
            },
            histograms: analyzer.histograms().clone(),
            spectra,
        }
    }

    /// Build and serialize a report to JSON.
    pub fn build_json(
        &self,
        path: &Path,
        recording: &Recording,
        analyzer: &Analyzer,
        peak_count: usize,
        pretty: bool,
    ) -> String {
        let report = self.build(path, recording, analyzer, peak_count);
        let serialized = if pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };
        serialized.unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn peaks_of(spectrum: &[f32], bin_rate: u32, count: usize) -> Vec<SpectralPeak> {
    top_peaks(&low_cut(spectrum), bin_rate, count)
}
