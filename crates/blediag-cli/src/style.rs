//! Visual styling utilities for the CLI.
//!
//! Spinners for long-running BLE operations and colored capability labels.
//! Colors are dropped when `NO_COLOR` is set or stdout is not a terminal.

use std::io::IsTerminal;
use std::time::Duration;

use blediag_core::Capabilities;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for scanning operations.
pub fn scanning_spinner(timeout_secs: u64) -> ProgressBar {
    spinner(format!("Scanning for BLE devices... ({}s)", timeout_secs))
}

/// Create a spinner for connecting to a device.
pub fn connecting_spinner(device: &str) -> ProgressBar {
    spinner(format!("Connecting to {}...", device))
}

/// Create a spinner for service discovery.
pub fn discovering_spinner() -> ProgressBar {
    spinner("Discovering services...".to_string())
}

/// Whether colored output should be used.
pub fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

/// Render capabilities as `[READ, WRITE, NOTIFY]`, colored when `color` is set.
pub fn capabilities(caps: &Capabilities, color: bool) -> String {
    if !color {
        return caps.to_string();
    }
    let names: Vec<String> = caps
        .names()
        .into_iter()
        .map(|name| match name {
            "READ" => name.green().to_string(),
            "NOTIFY" | "INDICATE" => name.cyan().to_string(),
            _ => name.yellow().to_string(),
        })
        .collect();
    format!("[{}]", names.join(", "))
}

/// Dim a secondary value.
pub fn dim(value: &str, color: bool) -> String {
    if color {
        value.dimmed().to_string()
    } else {
        value.to_string()
    }
}
