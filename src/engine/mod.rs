//! Core analysis engine.
//!
//! This module contains:
//! - Bin-rate validation and timestamp quantization
//! - The quantized event timeline and the three timing histograms
//! - The FFT worker pool and the coalescing spectral scheduler
//! - The `Analyzer` facade tying ingestion, replay and spectra together

pub mod analyzer;
pub mod bins;
pub mod fft;
pub mod histograms;
pub mod spectral;
pub mod timeline;

// Re-export commonly used types
pub use analyzer::{Analyzer, AnalyzerSnapshot};
pub use bins::{is_valid_bin_rate, BinConfig, DEFAULT_BIN_RATE, MICROS_PER_SEC};
pub use fft::{FftPool, FftPoolError, FftRequest, FftResponse, FFT_WORKERS};
pub use histograms::HistogramSet;
pub use spectral::{RoundInput, SpectralEngine, SpectrumSet};
pub use timeline::QuantizedTimeline;
