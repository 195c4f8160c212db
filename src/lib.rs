//! Keyjitter - incremental keystroke-timing jitter analyzer.
//!
//! This library turns streams of key-press timestamps into a quantized
//! timeline, three gap histograms, and magnitude spectra that expose
//! periodic structure (polling intervals, timer jitter, scan-rate
//! artifacts) in how the keystrokes were captured.
//!
//! # Pipeline
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Keyjitter                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐  │
//! │  │  Parser  │──▶│ Timeline │──▶│ Histograms │──▶│ Spectral │  │
//! │  │ kbi/json │   │ (binned) │   │  (3 kinds) │   │  (FFT)   │  │
//! │  └──────────┘   └──────────┘   └────────────┘   └──────────┘  │
//! │        │                                             │        │
//! │        ▼                                             ▼        │
//! │  ┌──────────┐                                  ┌──────────┐   │
//! │  │ Metadata │                                  │  Stats + │   │
//! │  │  (info)  │                                  │  Report  │   │
//! │  └──────────┘                                  └──────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use keyjitter::engine::Analyzer;
//! use std::time::Duration;
//!
//! let mut analyzer = Analyzer::new();
//! analyzer.add(&[0, 11_800, 24_100, 35_900]);
//!
//! // Spectra are recomputed in the background; wait for the round.
//! analyzer.wait_idle(Duration::from_secs(5));
//! let spectra = analyzer.spectra();
//! println!("{} spectrum bins", spectra.consecutive.len());
//! ```

pub mod config;
pub mod engine;
pub mod parser;
pub mod report;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use engine::{Analyzer, AnalyzerSnapshot, BinConfig, HistogramSet, SpectrumSet, DEFAULT_BIN_RATE};
pub use parser::{load_recording, ParseError, Recording, RecordingFormat};
pub use report::{JitterReport, ReportBuilder};
pub use stats::{gap_summary, GapSummary, SpectralPeak};

// Server re-exports (when enabled)
#[cfg(feature = "server")]
pub use server::ServerConfig;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
