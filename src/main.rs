//! Keyjitter CLI
//!
//! Incremental keystroke-timing jitter analyzer.

use clap::{Parser, Subcommand, ValueEnum};
use keyjitter::{
    config::Config,
    engine::{is_valid_bin_rate, Analyzer},
    parser::{load_recording, Recording, RecordingFormat},
    report::ReportBuilder,
    stats::{gap_summary, low_cut, top_peaks},
    VERSION,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "server")]
use keyjitter::server::{self, ServerConfig};

#[derive(Parser)]
#[command(name = "keyjitter")]
#[command(version = VERSION)]
#[command(about = "Incremental keystroke-timing jitter analyzer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a keystroke recording and print jitter statistics
    Analyze {
        /// Path to the recording (.kbi or .json)
        file: PathBuf,

        /// Input format (auto-detected if not specified)
        #[arg(long, value_enum, default_value = "auto")]
        format: FormatArg,

        /// Bin rate in bins per second (must be 125 * 2^k)
        #[arg(long)]
        bin_rate: Option<u32>,

        /// Write a full JSON report to this path
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,

        /// Number of spectral peaks to print per histogram
        #[arg(long, default_value = "5")]
        peaks: usize,
    },

    /// Show recording metadata without analyzing
    Info {
        /// Path to the recording (.kbi or .json)
        file: PathBuf,

        /// Input format (auto-detected if not specified)
        #[arg(long, value_enum, default_value = "auto")]
        format: FormatArg,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Run the loopback HTTP ingestion server
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1 (0 for random)
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Bin rate in bins per second (must be 125 * 2^k)
        #[arg(long)]
        bin_rate: Option<u32>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,

    /// Set the default bin rate
    SetBinRate {
        /// New default bin rate in bins per second (must be 125 * 2^k)
        rate: u32,
    },

    /// Restore default configuration
    Reset,
}

/// Recording format selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Detect from magic bytes, content, or extension
    Auto,
    /// Legacy binary recording
    Kbi,
    /// JSON recording
    Json,
}

impl FormatArg {
    fn to_format(self) -> Option<RecordingFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Kbi => Some(RecordingFormat::KbiLegacy),
            FormatArg::Json => Some(RecordingFormat::Json),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Analyze {
            file,
            format,
            bin_rate,
            out,
            pretty,
            peaks,
        } => {
            cmd_analyze(&file, format, bin_rate, out, pretty, peaks);
        }
        Commands::Info { file, format } => {
            cmd_info(&file, format);
        }
        Commands::Config { action } => {
            cmd_config(action);
        }
        #[cfg(feature = "server")]
        Commands::Serve { port, bin_rate } => {
            cmd_serve(port, bin_rate);
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter when set. Diagnostics go to
/// stderr so piped report output stays clean.
fn init_logging() {
    let config = Config::load().unwrap_or_default();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_analyze(
    file: &Path,
    format: FormatArg,
    bin_rate: Option<u32>,
    out: Option<PathBuf>,
    pretty: bool,
    peaks: usize,
) {
    let config = Config::load().unwrap_or_default();

    let recording = match load_recording(file, format.to_format()) {
        Ok(recording) => recording,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let rate = bin_rate.unwrap_or_else(|| config.effective_bin_rate());
    let mut analyzer = match Analyzer::with_bin_rate(rate) {
        Some(analyzer) => analyzer,
        None => {
            eprintln!("Error: invalid bin rate {rate} (must be 125 * 2^k, e.g. 1000 or 16000)");
            std::process::exit(1);
        }
    };

    println!("Keyjitter v{VERSION}");
    println!();
    print_recording(file, &recording);

    let presses = recording.press_timestamps();
    analyzer.add(&presses);

    println!();
    println!("Analysis:");
    println!(
        "  Bin rate: {} bins/s (interval {:.3} µs)",
        analyzer.bin_rate(),
        analyzer.interval()
    );
    println!("  Accepted: {} press events", analyzer.accepted());
    if analyzer.rejected() > 0 {
        println!("  Rejected: {} out-of-order events", analyzer.rejected());
    }
    println!("  Distinct bins: {}", analyzer.distinct_bins());

    if let Some(summary) = gap_summary(analyzer.raw_log()) {
        println!();
        println!("Inter-key gaps:");
        println!("  Count: {}", summary.count);
        println!("  Mean: {:.2} ms", summary.mean_ms);
        println!("  Std dev: {:.2} ms", summary.std_dev_ms);
        println!("  Min: {:.2} ms", summary.min_ms);
        println!("  Median: {:.2} ms", summary.median_ms);
        println!("  P95: {:.2} ms", summary.p95_ms);
        println!("  P99: {:.2} ms", summary.p99_ms);
        println!("  Max: {:.2} ms", summary.max_ms);
    }

    if !analyzer.wait_idle(Duration::from_secs(30)) {
        eprintln!("Warning: spectral round still running after 30s; peaks may lag the input");
    }

    let spectra = analyzer.spectra();
    print_peaks("Consecutive-gap peaks", &spectra.consecutive, rate, peaks);
    print_peaks("All-pairs peaks", &spectra.all_pairs, rate, peaks);
    print_peaks("Wrapped peaks", &spectra.wrapped, rate, peaks);

    if let Some(out_path) = out {
        let pretty = pretty || config.pretty_export;
        let builder = ReportBuilder::new();
        let json = builder.build_json(file, &recording, &analyzer, peaks, pretty);

        if let Some(parent) = out_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match std::fs::write(&out_path, json) {
            Ok(()) => {
                println!();
                println!("Wrote report to {out_path:?}");
            }
            Err(e) => {
                eprintln!("Error writing report: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn cmd_info(file: &Path, format: FormatArg) {
    let recording = match load_recording(file, format.to_format()) {
        Ok(recording) => recording,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    print_recording(file, &recording);

    if !recording.devices.is_empty() {
        println!();
        println!("Devices:");
        for device in &recording.devices {
            let ids = match (device.vendor_id, device.product_id) {
                (Some(vid), Some(pid)) => format!(" [{vid:04x}:{pid:04x}]"),
                _ => String::new(),
            };
            println!("  {}: {}{}", device.id, device.name, ids);
        }
    }
}

fn cmd_config(action: Option<ConfigAction>) {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = Config::load().unwrap_or_default();

            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file: {:?}", Config::config_path());
            println!();
            println!(
                "{}",
                serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
            );
        }
        ConfigAction::SetBinRate { rate } => {
            if !is_valid_bin_rate(rate) {
                eprintln!("Error: invalid bin rate {rate} (must be 125 * 2^k, e.g. 1000 or 16000)");
                std::process::exit(1);
            }

            let mut config = Config::load().unwrap_or_default();
            config.default_bin_rate = rate;
            if let Err(e) = config.save() {
                eprintln!("Error saving config: {e}");
                std::process::exit(1);
            }
            println!("Default bin rate set to {rate} bins/s.");
        }
        ConfigAction::Reset => {
            if let Err(e) = Config::default().save() {
                eprintln!("Error saving config: {e}");
                std::process::exit(1);
            }
            println!("Configuration reset to defaults.");
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, bin_rate: Option<u32>) {
    let config = Config::load().unwrap_or_default();
    let rate = bin_rate.unwrap_or_else(|| config.effective_bin_rate());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating async runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let (addr, shutdown_tx, server_handle) =
            match server::run(ServerConfig::new(port, rate)).await {
                Ok(parts) => parts,
                Err(e) => {
                    eprintln!("Error starting server: {e}");
                    std::process::exit(1);
                }
            };

        println!("Keyjitter server v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Analyzing at {rate} bins/s");
        println!();
        println!("Press Ctrl+C to stop");

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .expect("Error setting Ctrl+C handler");

        let _ = tokio::task::spawn_blocking(move || stop_rx.recv()).await;

        println!();
        println!("Stopping server...");
        let _ = shutdown_tx.send(());
        let _ = server_handle.await;
    });
}

fn print_recording(path: &Path, recording: &Recording) {
    println!("Recording: {}", path.display());
    println!("  Format: {}", recording.meta.format);
    if let Some(title) = &recording.meta.title {
        println!("  Title: {title}");
    }
    if let Some(creator) = &recording.meta.creator {
        println!("  Creator: {creator}");
    }
    if let Some(system) = &recording.meta.system {
        println!("  System: {system}");
    }
    if let Some(started_at) = recording.meta.started_at {
        println!("  Started: {}", started_at.to_rfc3339());
    }
    println!("  Devices: {}", recording.devices.len());
    println!(
        "  Events: {} ({} presses)",
        recording.events.len(),
        recording.press_count()
    );
}

fn print_peaks(label: &str, spectrum: &[f32], bin_rate: u32, count: usize) {
    let peaks = top_peaks(&low_cut(spectrum), bin_rate, count);

    println!();
    println!("{label}:");
    if peaks.is_empty() {
        println!("  (none found)");
        return;
    }
    for peak in peaks {
        println!(
            "  {:>10.2} Hz  magnitude {:.3}",
            peak.frequency_hz, peak.magnitude
        );
    }
}
