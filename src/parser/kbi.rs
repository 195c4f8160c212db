//! Legacy binary KBI recordings.
//!
//! Layout, all integers little-endian, strings ULEB128-length-prefixed
//! UTF-8:
//!
//! ```text
//! "KBI\0"   u32 version (3)
//! creator: string    title: string
//! started: u64 ticks (100ns since 0001-01-01)
//! duration: f64 seconds
//! events:  i32 count * { time: f64 secs, pressed: u8, key: string, source: i64 }
//! devices: i32 count * { id: i64, inputs: i32, name: string, device_id: string }
//! ```

use crate::parser::{
    ParseError, RecordedDevice, RecordedEvent, Recording, RecordingFormat, RecordingMeta,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub(crate) const KBI_MAGIC: &[u8; 4] = b"KBI\0";
const SUPPORTED_VERSION: u32 = 3;
/// 100ns ticks between 0001-01-01 and the unix epoch.
const UNIX_EPOCH_TICKS: u64 = 621_355_968_000_000_000;

struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ParseError::Truncated(self.offset))?;
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn read_i32(&mut self) -> Result<i32, ParseError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    fn read_u64(&mut self) -> Result<u64, ParseError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn read_i64(&mut self) -> Result<i64, ParseError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }

    fn read_f64(&mut self) -> Result<f64, ParseError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_uleb128(&mut self) -> Result<u64, ParseError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            if shift >= 64 {
                return Err(ParseError::InvalidField("length varint too long".into()));
            }
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let len = self.read_uleb128()?;
        let len = usize::try_from(len)
            .map_err(|_| ParseError::InvalidField("string length out of range".into()))?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ParseError::InvalidField("string is not valid UTF-8".into()))
    }

    fn read_list_len(&mut self) -> Result<usize, ParseError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| ParseError::InvalidField("negative list length".into()))
    }
}

/// Parse a KBI v3 recording.
pub fn parse(bytes: &[u8]) -> Result<Recording, ParseError> {
    let mut reader = Reader::new(bytes);
    if reader.take(KBI_MAGIC.len())? != KBI_MAGIC {
        return Err(ParseError::BadMagic);
    }
    let version = reader.read_u32()?;
    if version != SUPPORTED_VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }

    let creator = reader.read_string()?;
    let title = reader.read_string()?;
    let started_at = started_at_from_ticks(reader.read_u64()?);
    // Session duration in seconds; nothing downstream needs it.
    let _duration = reader.read_f64()?;

    let event_count = reader.read_list_len()?;
    let mut raw_events = Vec::with_capacity(event_count.min(4096));
    for _ in 0..event_count {
        let time_secs = reader.read_f64()?;
        if !time_secs.is_finite() || time_secs < 0.0 {
            return Err(ParseError::InvalidField("event time out of range".into()));
        }
        let pressed = reader.read_u8()? != 0;
        // Key label; timing analysis does not use it.
        let _key = reader.read_string()?;
        let source = reader.read_i64()?;
        raw_events.push((time_secs, pressed, source));
    }

    let device_count = reader.read_list_len()?;
    let mut devices = Vec::with_capacity(device_count.min(64));
    let mut sources: HashMap<i64, String> = HashMap::new();
    for _ in 0..device_count {
        let id = reader.read_i64()?;
        let _input_count = reader.read_i32()?;
        let name = reader.read_string()?;
        let device_id = reader.read_string()?;
        sources.insert(id, device_id.clone());
        devices.push(RecordedDevice {
            id: device_id,
            name,
            vendor_id: None,
            product_id: None,
        });
    }

    let events = raw_events
        .into_iter()
        .map(|(time_secs, pressed, source)| RecordedEvent {
            timestamp_us: (time_secs * 1e6).round() as u64,
            pressed,
            // Events whose source has no device entry keep the raw id.
            device_id: sources
                .get(&source)
                .cloned()
                .unwrap_or_else(|| source.to_string()),
        })
        .collect();

    Ok(Recording {
        meta: RecordingMeta {
            format: RecordingFormat::KbiLegacy,
            title: non_empty(title),
            creator: non_empty(creator),
            system: None,
            started_at,
        },
        devices,
        events,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn started_at_from_ticks(ticks: u64) -> Option<DateTime<Utc>> {
    let micros = ticks.checked_sub(UNIX_EPOCH_TICKS)? / 10;
    DateTime::from_timestamp_micros(i64::try_from(micros).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_uleb(buf: &mut Vec<u8>, mut value: u64) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn push_string(buf: &mut Vec<u8>, s: &str) {
        push_uleb(buf, s.len() as u64);
        buf.extend_from_slice(s.as_bytes());
    }

    fn push_event(buf: &mut Vec<u8>, time_secs: f64, pressed: bool, key: &str, source: i64) {
        buf.extend_from_slice(&time_secs.to_le_bytes());
        buf.push(pressed as u8);
        push_string(buf, key);
        buf.extend_from_slice(&source.to_le_bytes());
    }

    fn sample_recording() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(KBI_MAGIC);
        buf.extend_from_slice(&3u32.to_le_bytes());
        push_string(&mut buf, "recorder");
        push_string(&mut buf, "morning session");
        // 2024-01-01T00:00:00Z
        let ticks = UNIX_EPOCH_TICKS + 1_704_067_200_000_000 * 10;
        buf.extend_from_slice(&ticks.to_le_bytes());
        buf.extend_from_slice(&1.5f64.to_le_bytes());
        buf.extend_from_slice(&3i32.to_le_bytes());
        push_event(&mut buf, 0.25, true, "KeyA", 7);
        push_event(&mut buf, 0.5, false, "KeyA", 7);
        push_event(&mut buf, 0.75, true, "KeyB", 7);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&7i64.to_le_bytes());
        buf.extend_from_slice(&2i32.to_le_bytes());
        push_string(&mut buf, "Test Keyboard");
        push_string(&mut buf, "kbd-0");
        buf
    }

    #[test]
    fn test_parses_sample_recording() {
        let recording = parse(&sample_recording()).expect("sample should parse");

        assert_eq!(recording.meta.format, RecordingFormat::KbiLegacy);
        assert_eq!(recording.meta.creator.as_deref(), Some("recorder"));
        assert_eq!(recording.meta.title.as_deref(), Some("morning session"));
        assert_eq!(
            recording.meta.started_at,
            DateTime::from_timestamp(1_704_067_200, 0)
        );

        assert_eq!(recording.devices.len(), 1);
        assert_eq!(recording.devices[0].id, "kbd-0");
        assert_eq!(recording.devices[0].name, "Test Keyboard");

        assert_eq!(recording.events.len(), 3);
        assert_eq!(recording.events[0].timestamp_us, 250_000);
        assert!(recording.events[0].pressed);
        assert_eq!(recording.events[1].timestamp_us, 500_000);
        assert!(!recording.events[1].pressed);
        assert_eq!(recording.events[2].device_id, "kbd-0");

        assert_eq!(recording.press_timestamps(), vec![250_000, 750_000]);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut buf = sample_recording();
        buf[0] = b'X';
        assert!(matches!(parse(&buf), Err(ParseError::BadMagic)));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut buf = sample_recording();
        buf[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(parse(&buf), Err(ParseError::UnsupportedVersion(2))));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let buf = sample_recording();
        let cut = &buf[..buf.len() / 2];
        assert!(matches!(parse(cut), Err(ParseError::Truncated(_))));
    }

    #[test]
    fn test_rejects_negative_list_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(KBI_MAGIC);
        buf.extend_from_slice(&3u32.to_le_bytes());
        push_string(&mut buf, "");
        push_string(&mut buf, "");
        buf.extend_from_slice(&UNIX_EPOCH_TICKS.to_le_bytes());
        buf.extend_from_slice(&0.0f64.to_le_bytes());
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(parse(&buf), Err(ParseError::InvalidField(_))));
    }

    #[test]
    fn test_unknown_source_keeps_raw_id() {
        let mut buf = Vec::new();
        buf.extend_from_slice(KBI_MAGIC);
        buf.extend_from_slice(&3u32.to_le_bytes());
        push_string(&mut buf, "");
        push_string(&mut buf, "");
        buf.extend_from_slice(&UNIX_EPOCH_TICKS.to_le_bytes());
        buf.extend_from_slice(&0.5f64.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        push_event(&mut buf, 0.1, true, "KeyA", 99);
        buf.extend_from_slice(&0i32.to_le_bytes());

        let recording = parse(&buf).expect("should parse");
        assert_eq!(recording.meta.title, None);
        assert_eq!(recording.events[0].device_id, "99");
    }

    #[test]
    fn test_pre_epoch_start_time_is_none() {
        let mut buf = sample_recording();
        let recording = parse(&buf).expect("should parse");
        assert!(recording.meta.started_at.is_some());

        // Overwrite the start-time ticks with a pre-1970 value.
        let tick_offset = 4 + 4 + 1 + "recorder".len() + 1 + "morning session".len();
        buf[tick_offset..tick_offset + 8].copy_from_slice(&1_000u64.to_le_bytes());
        let recording = parse(&buf).expect("should still parse");
        assert_eq!(recording.meta.started_at, None);
    }
}
