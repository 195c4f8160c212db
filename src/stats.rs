//! Summary statistics over gaps and spectra.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

/// Consecutive gap statistics in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapSummary {
    pub count: usize,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Summarize the gaps between consecutive timestamps (microseconds,
/// ascending). Returns `None` for fewer than two timestamps.
pub fn gap_summary(timestamps_us: &[u64]) -> Option<GapSummary> {
    if timestamps_us.len() < 2 {
        return None;
    }
    let gaps_ms: Vec<f64> = timestamps_us
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 / 1_000.0)
        .collect();

    let count = gaps_ms.len();
    let mean_ms = (&gaps_ms).mean();
    let std_dev_ms = if count > 1 { (&gaps_ms).std_dev() } else { 0.0 };
    let min_ms = (&gaps_ms).min();
    let max_ms = (&gaps_ms).max();

    let mut data = Data::new(gaps_ms);
    Some(GapSummary {
        count,
        mean_ms,
        std_dev_ms,
        min_ms,
        max_ms,
        median_ms: data.median(),
        p95_ms: data.percentile(95),
        p99_ms: data.percentile(99),
    })
}

/// Width of the attenuated near-DC region, in spectrum bins.
const LOW_CUT_BINS: usize = 70;

/// Suppress the near-DC region with a logistic ramp so low-frequency
/// mass does not drown out real peaks.
pub fn low_cut(spectrum: &[f32]) -> Vec<f32> {
    let mut result = spectrum.to_vec();
    for (i, value) in result.iter_mut().take(LOW_CUT_BINS).enumerate() {
        *value /= 1.0 + (-(i as f32 - 25.0) / 4.0).exp();
    }
    result
}

/// One spectral peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralPeak {
    pub frequency_hz: f64,
    pub magnitude: f32,
}

/// Largest local maxima of a magnitude spectrum, DC excluded.
///
/// The histogram behind the spectrum is sampled at `bin_rate` Hz over
/// `bin_rate + 1` slots, so spectrum bin `i` sits at
/// `i * bin_rate / (bin_rate + 1)` Hz.
pub fn top_peaks(spectrum: &[f32], bin_rate: u32, count: usize) -> Vec<SpectralPeak> {
    if spectrum.len() < 3 || count == 0 {
        return Vec::new();
    }
    let histogram_len = f64::from(bin_rate) + 1.0;
    let mut peaks: Vec<SpectralPeak> = Vec::new();
    for i in 1..spectrum.len() - 1 {
        let magnitude = spectrum[i];
        if magnitude > spectrum[i - 1] && magnitude >= spectrum[i + 1] && magnitude > 0.0 {
            peaks.push(SpectralPeak {
                frequency_hz: i as f64 * f64::from(bin_rate) / histogram_len,
                magnitude,
            });
        }
    }
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(count);
    peaks
}
