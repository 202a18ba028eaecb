//! CLI argument definitions using clap.

use std::path::PathBuf;

use blediag_core::{Terminator, WriteMode};
use blediag_types::Format;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "blediag")]
#[command(author, version, about = "Diagnostic client for BLE GATT peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Write output to file instead of stdout (poll writes CSV here)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, env = "BLEDIAG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby BLE peripherals
    Scan {
        /// Scan duration in seconds
        #[arg(short = 'T', long, default_value = "5")]
        timeout: u64,

        /// Only list peripherals advertising one of these services (comma-separated)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,
    },

    /// List primary services and characteristics with their capabilities
    Services {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read a characteristic once
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Value format (auto, hex, utf8, uint16le, float32be, ...)
        #[arg(short, long)]
        format: Option<Format>,
    },

    /// Encode a value and write it to a characteristic
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Value format used to encode VALUE
        #[arg(short, long)]
        format: Option<Format>,

        /// Write mode (auto, with-response, without-response, generic)
        #[arg(short, long, default_value = "auto")]
        mode: WriteMode,

        /// Line terminator appended after encoding (none, lf, cr, crlf)
        #[arg(short, long, default_value = "none")]
        terminator: Terminator,

        /// Value to write
        value: String,
    },

    /// Subscribe to notifications and print each value
    Subscribe {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Value format
        #[arg(short, long)]
        format: Option<Format>,

        /// Stop after this many notifications (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,
    },

    /// Poll a characteristic on a timer and record the samples
    Poll {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Value format
        #[arg(short, long)]
        format: Option<Format>,

        /// Poll interval in milliseconds (minimum 1000)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many samples (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Skip a tick while the previous one is still running
        #[arg(long)]
        skip_while_busy: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default config file if none exists
    Init,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device name, address or peripheral ID, or use BLEDIAG_DEVICE env var
    #[arg(short, long, env = "BLEDIAG_DEVICE")]
    pub device: Option<String>,

    /// Service UUIDs to filter the scan and discover individually (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long, default_value = "30")]
    pub timeout: u64,
}

/// The characteristic to operate on
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Service UUID, canonical or 0x-prefixed shorthand
    #[arg(short, long)]
    pub service: Option<String>,

    /// Characteristic UUID, canonical or 0x-prefixed shorthand
    #[arg(short, long)]
    pub characteristic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "blediag", "write", "-d", "HMSoft", "-s", "0xffe0", "-c", "0xffe1", "-f", "utf8",
            "-m", "command", "-t", "crlf", "AT",
        ])
        .unwrap();

        let Commands::Write {
            device,
            target,
            format,
            mode,
            terminator,
            value,
        } = cli.command
        else {
            panic!("expected write");
        };
        assert_eq!(device.device.as_deref(), Some("HMSoft"));
        assert_eq!(target.service.as_deref(), Some("0xffe0"));
        assert_eq!(target.characteristic.as_deref(), Some("0xffe1"));
        assert_eq!(format, Some(Format::Utf8));
        assert_eq!(mode, WriteMode::WithoutResponse);
        assert_eq!(terminator, Terminator::CrLf);
        assert_eq!(value, "AT");
    }

    #[test]
    fn test_parse_poll_defaults() {
        let cli = Cli::try_parse_from(["blediag", "poll", "-o", "out.csv"]).unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("out.csv")));
        let Commands::Poll {
            interval,
            count,
            duration,
            skip_while_busy,
            ..
        } = cli.command
        else {
            panic!("expected poll");
        };
        assert_eq!(interval, None);
        assert_eq!(count, 0);
        assert_eq!(duration, None);
        assert!(!skip_while_busy);
    }

    #[test]
    fn test_parse_services_list() {
        let cli =
            Cli::try_parse_from(["blediag", "scan", "--services", "0xffe0,0x180f"]).unwrap();
        let Commands::Scan { services, timeout } = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(services, vec!["0xffe0", "0x180f"]);
        assert_eq!(timeout, 5);
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["blediag", "read", "-f", "uint24"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["blediag", "write", "-m", "sometimes", "1"]).is_err());
    }
}
