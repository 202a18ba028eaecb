//! Command-line diagnostic client for BLE GATT peripherals.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby peripherals |
//! | `services` | List services and characteristic capabilities |
//! | `read` | Read a characteristic once |
//! | `write` | Encode and write a value |
//! | `subscribe` | Print notifications as they arrive |
//! | `poll` | Poll on a timer, optionally exporting CSV |
//! | `config` | Manage the configuration file |
//!
//! # Configuration
//!
//! Settings are read from `~/.config/blediag/config.toml` (or platform
//! equivalent), or the file named by `--config` / `BLEDIAG_CONFIG`:
//!
//! ```toml
//! device = "HMSoft"
//! services = ["0xffe0"]
//! characteristic = "0xffe1"
//! format = "utf8"
//! interval_ms = 2000
//!
//! [[auto_formats.rules]]
//! marker = "2a19"
//! decode = "byte"
//! ```
//!
//! # Environment Variables
//!
//! - `BLEDIAG_DEVICE`: Default device (overridden by `--device`)
//! - `BLEDIAG_CONFIG`: Config file path
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//! - `NO_COLOR`: Disable colored output when set
//!
//! # Examples
//!
//! ```bash
//! blediag scan --services 0xffe0
//! blediag read -d HMSoft -c 0xffe3 -f auto
//! blediag write -d HMSoft -f utf8 -t crlf "AT+VERSION"
//! blediag poll -d HMSoft -i 2000 -n 30 -o samples.csv
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod style;
pub mod util;

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::commands::{PollArgs, WriteArgs};
use crate::config::Config;

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load_or_default(&config_path);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { timeout, services } => {
            commands::cmd_scan(timeout, &services, cli.json, output, cli.quiet, &config).await
        }
        Commands::Services { device } => {
            commands::cmd_services(&device, cli.json, output, cli.quiet, &config).await
        }
        Commands::Read {
            device,
            target,
            format,
        } => {
            commands::cmd_read(
                &device, &target, format, cli.json, output, cli.quiet, &config,
            )
            .await
        }
        Commands::Write {
            device,
            target,
            format,
            mode,
            terminator,
            value,
        } => {
            commands::cmd_write(
                WriteArgs {
                    device: &device,
                    target: &target,
                    format,
                    mode,
                    terminator,
                    value: &value,
                    json: cli.json,
                    output,
                    quiet: cli.quiet,
                },
                &config,
            )
            .await
        }
        Commands::Subscribe {
            device,
            target,
            format,
            count,
        } => {
            commands::cmd_subscribe(
                &device, &target, format, count, cli.json, output, cli.quiet, &config,
            )
            .await
        }
        Commands::Poll {
            device,
            target,
            format,
            interval,
            count,
            duration,
            skip_while_busy,
        } => {
            commands::cmd_poll(
                PollArgs {
                    device: &device,
                    target: &target,
                    format,
                    interval_ms: interval,
                    count,
                    duration,
                    skip_while_busy,
                    json: cli.json,
                    output,
                    quiet: cli.quiet,
                },
                &config,
            )
            .await
        }
        Commands::Config { action } => commands::cmd_config(action, &config_path, &config),
    }
}
