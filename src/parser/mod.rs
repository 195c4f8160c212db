//! Recording file parsers.
//!
//! Two on-disk formats produce the same in-memory [`Recording`]: the
//! legacy binary KBI format and the JSON export. Format detection
//! sniffs file content and falls back to the file extension.

pub mod json;
pub mod kbi;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// On-disk recording format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingFormat {
    KbiLegacy,
    Json,
}

impl fmt::Display for RecordingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingFormat::KbiLegacy => write!(f, "kbi-legacy"),
            RecordingFormat::Json => write!(f, "json"),
        }
    }
}

/// Session-level metadata. Each format fills in what it has; the rest
/// stays `None`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingMeta {
    pub format: RecordingFormat,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub system: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedDevice {
    pub id: String,
    pub name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// One key event attributed to a device.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub timestamp_us: u64,
    pub pressed: bool,
    pub device_id: String,
}

/// A fully parsed recording session.
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    pub meta: RecordingMeta,
    pub devices: Vec<RecordedDevice>,
    pub events: Vec<RecordedEvent>,
}

impl Recording {
    /// Key-down timestamps across all devices, ascending.
    ///
    /// Duplicates are kept; simultaneous presses on different devices
    /// are distinct events.
    pub fn press_timestamps(&self) -> Vec<u64> {
        let mut timestamps: Vec<u64> = self
            .events
            .iter()
            .filter(|e| e.pressed)
            .map(|e| e.timestamp_us)
            .collect();
        timestamps.sort_unstable();
        timestamps
    }

    pub fn press_count(&self) -> usize {
        self.events.iter().filter(|e| e.pressed).count()
    }
}

/// Parsing errors.
#[derive(Debug)]
pub enum ParseError {
    IoError(String),
    JsonError(String),
    UnknownFormat,
    BadMagic,
    UnsupportedVersion(u32),
    Truncated(usize),
    InvalidField(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IoError(e) => write!(f, "IO error: {e}"),
            ParseError::JsonError(e) => write!(f, "JSON error: {e}"),
            ParseError::UnknownFormat => write!(f, "could not determine recording format"),
            ParseError::BadMagic => write!(f, "not a KBI recording (bad magic)"),
            ParseError::UnsupportedVersion(v) => write!(f, "unsupported KBI version {v}"),
            ParseError::Truncated(offset) => write!(f, "file truncated at byte {offset}"),
            ParseError::InvalidField(e) => write!(f, "invalid field: {e}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Detect the format from content, falling back to the extension.
pub fn detect_format(bytes: &[u8], path: &Path) -> Option<RecordingFormat> {
    if bytes.starts_with(kbi::KBI_MAGIC) {
        return Some(RecordingFormat::KbiLegacy);
    }
    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        return Some(RecordingFormat::Json);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("kbi") => Some(RecordingFormat::KbiLegacy),
        Some(ext) if ext.eq_ignore_ascii_case("json") => Some(RecordingFormat::Json),
        _ => None,
    }
}

/// Read and parse a recording, detecting the format unless one is forced.
pub fn load_recording(
    path: &Path,
    format: Option<RecordingFormat>,
) -> Result<Recording, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::IoError(e.to_string()))?;
    let format = match format {
        Some(format) => format,
        None => detect_format(&bytes, path).ok_or(ParseError::UnknownFormat)?,
    };
    match format {
        RecordingFormat::KbiLegacy => kbi::parse(&bytes),
        RecordingFormat::Json => json::parse(&bytes),
    }
}
