//! JSON recordings produced by the recorder's text exporter.
//!
//! Timestamps are microseconds as JSON numbers. Unknown fields such as
//! `usb_devices` or key codes are ignored; range violations reject the
//! whole file.

use crate::parser::{
    ParseError, RecordedDevice, RecordedEvent, Recording, RecordingFormat, RecordingMeta,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct RawRecording {
    info: RawInfo,
    time: String,
    devices: BTreeMap<String, RawDevice>,
    inputs: BTreeMap<String, Vec<RawInput>>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    os_name: String,
    os_ver: String,
    arch: String,
    backend: String,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    name: String,
    vid: u32,
    pid: u32,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    timestamp: f64,
    pressed: bool,
}

/// Parse a JSON recording.
pub fn parse(bytes: &[u8]) -> Result<Recording, ParseError> {
    let raw: RawRecording =
        serde_json::from_slice(bytes).map_err(|e| ParseError::JsonError(e.to_string()))?;

    let mut devices = Vec::with_capacity(raw.devices.len());
    for (id, device) in raw.devices {
        let vendor_id = u16::try_from(device.vid).map_err(|_| {
            ParseError::InvalidField(format!("vendor id {} out of range", device.vid))
        })?;
        let product_id = u16::try_from(device.pid).map_err(|_| {
            ParseError::InvalidField(format!("product id {} out of range", device.pid))
        })?;
        devices.push(RecordedDevice {
            id,
            name: device.name,
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
        });
    }

    let mut events = Vec::new();
    for (device_id, inputs) in raw.inputs {
        for input in inputs {
            if !input.timestamp.is_finite() || input.timestamp < 0.0 {
                return Err(ParseError::InvalidField(format!(
                    "timestamp {} out of range for device {device_id}",
                    input.timestamp
                )));
            }
            events.push(RecordedEvent {
                timestamp_us: input.timestamp.round() as u64,
                pressed: input.pressed,
                device_id: device_id.clone(),
            });
        }
    }

    Ok(Recording {
        meta: RecordingMeta {
            format: RecordingFormat::Json,
            title: None,
            creator: None,
            system: system_summary(&raw.info),
            started_at: DateTime::parse_from_rfc3339(&raw.time)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        },
        devices,
        events,
    })
}

fn system_summary(info: &RawInfo) -> Option<String> {
    if info.os_name.is_empty() && info.backend.is_empty() {
        return None;
    }
    Some(format!(
        "{} {} ({}, {} backend)",
        info.os_name, info.os_ver, info.arch, info.backend
    ))
}
