//! Output formatting for text and JSON.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use blediag_core::{DiscoveredDevice, ServiceDescription, WriteReport};
use blediag_types::codec::to_hex;
use blediag_types::{CharacteristicRef, Sample};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::style;

#[derive(Serialize)]
struct DeviceJson<'a> {
    name: Option<&'a str>,
    identifier: &'a str,
    address: &'a str,
    rssi: Option<i16>,
    services: Vec<String>,
}

#[derive(Serialize)]
struct ServiceJson {
    uuid: String,
    characteristics: Vec<CharacteristicJson>,
}

#[derive(Serialize)]
struct CharacteristicJson {
    uuid: String,
    capabilities: Vec<&'static str>,
}

#[derive(Serialize)]
struct WriteJson {
    target: String,
    bytes: usize,
    hex: String,
    mode: String,
}

pub fn format_scan_text(devices: &[DiscoveredDevice], color: bool) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "Found {} device(s):\n", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<24} {:<38} {}",
            device.name.as_deref().unwrap_or("Unknown"),
            device.identifier,
            style::dim(&rssi, color)
        );
        for service in &device.services {
            let _ = writeln!(out, "      {}", style::dim(&service.to_string(), color));
        }
    }
    out
}

pub fn format_scan_json(devices: &[DiscoveredDevice]) -> Result<String> {
    let entries: Vec<DeviceJson<'_>> = devices
        .iter()
        .map(|device| DeviceJson {
            name: device.name.as_deref(),
            identifier: &device.identifier,
            address: &device.address,
            rssi: device.rssi,
            services: device.services.iter().map(ToString::to_string).collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries).context("Failed to serialize devices")? + "\n")
}

pub fn format_services_text(descriptions: &[ServiceDescription], color: bool) -> String {
    if !color {
        return descriptions.iter().map(ToString::to_string).collect();
    }
    let mut out = String::new();
    for description in descriptions {
        let _ = writeln!(out, "Service {}", description.service.uuid);
        for characteristic in &description.characteristics {
            let _ = writeln!(
                out,
                "  Characteristic {} {}",
                characteristic.uuid,
                style::capabilities(&characteristic.capabilities, true)
            );
        }
    }
    out
}

pub fn format_services_json(descriptions: &[ServiceDescription]) -> Result<String> {
    let entries: Vec<ServiceJson> = descriptions
        .iter()
        .map(|description| ServiceJson {
            uuid: description.service.uuid.to_string(),
            characteristics: description
                .characteristics
                .iter()
                .map(|c| CharacteristicJson {
                    uuid: c.uuid.to_string(),
                    capabilities: c.capabilities.names(),
                })
                .collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries).context("Failed to serialize services")? + "\n")
}

/// One line per sample: `timestamp  value  [hex]`, then ADC channels if any.
pub fn format_sample_text(sample: &Sample, color: bool) -> String {
    let timestamp = sample
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| sample.timestamp.to_string());
    let mut out = format!(
        "{}  {}  {}\n",
        style::dim(&timestamp, color),
        sample.value,
        style::dim(&format!("[{}]", sample.raw_hex), color)
    );
    if let Some(channels) = &sample.adc {
        for channel in channels {
            let _ = writeln!(
                out,
                "    CH{}: {:>5}  {:.3} V  {:.1}%",
                channel.channel, channel.raw, channel.voltage, channel.percentage
            );
        }
    }
    out
}

/// One compact JSON object per sample.
pub fn format_sample_json(sample: &Sample) -> Result<String> {
    Ok(serde_json::to_string(sample).context("Failed to serialize sample")? + "\n")
}

pub fn format_sample(sample: &Sample, json: bool, color: bool) -> Result<String> {
    if json {
        format_sample_json(sample)
    } else {
        Ok(format_sample_text(sample, color))
    }
}

pub fn format_write(
    target: &CharacteristicRef,
    report: &WriteReport,
    json: bool,
) -> Result<String> {
    if json {
        let entry = WriteJson {
            target: target.to_string(),
            bytes: report.bytes.len(),
            hex: to_hex(&report.bytes),
            mode: report.primitive.to_string(),
        };
        return Ok(serde_json::to_string(&entry).context("Failed to serialize write")? + "\n");
    }
    Ok(format!(
        "Wrote {} byte(s) to {} ({}): {}\n",
        report.bytes.len(),
        target,
        report.primitive,
        to_hex(&report.bytes)
    ))
}
