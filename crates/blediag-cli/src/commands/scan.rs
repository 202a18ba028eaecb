//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use blediag_core::{ScanOptions, scan};

use crate::config::{Config, parse_uuid_list};
use crate::format::{format_scan_json, format_scan_text};
use crate::style;
use crate::util::write_output;

pub async fn cmd_scan(
    timeout: u64,
    services: &[String],
    json: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let services = if services.is_empty() {
        config.service_uuids()?
    } else {
        parse_uuid_list(services)?
    };

    let spinner = (!quiet && !json).then(|| style::scanning_spinner(timeout));

    let options = ScanOptions::default()
        .duration(Duration::from_secs(timeout))
        .services(services);
    let result = scan::scan_with_options(options).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let mut devices = result.context("Failed to scan for devices")?;
    devices.sort_by(|a, b| b.rssi.cmp(&a.rssi));

    let content = if json {
        format_scan_json(&devices)?
    } else {
        format_scan_text(&devices, output.is_none() && style::use_color())
    };
    write_output(output, &content)
}
