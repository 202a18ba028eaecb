//! Shared helpers for commands.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use blediag_core::{
    BleTransport, ConnectionConfig, ConnectionSession, RetryConfig, ScanOptions, with_retry,
};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device, resolve_services};
use crate::style;

/// Require a device identifier, with a hint on where to set one.
pub fn require_device(device: Option<String>) -> Result<String> {
    match device {
        Some(device) => Ok(device),
        None => bail!(
            "No device specified. Use --device, set BLEDIAG_DEVICE, \
             add `device = \"...\"` to the config file, or pass --services to \
             connect to the first peripheral advertising one of them."
        ),
    }
}

/// Connect to the peripheral named by `args` (or the config) and open a session.
///
/// With no device identifier, the first peripheral advertising one of the
/// configured services is used.
pub async fn connect(
    args: &DeviceArgs,
    config: &Config,
    quiet: bool,
) -> Result<Arc<ConnectionSession>> {
    let services = resolve_services(args, config)?;
    let device = resolve_device(args.device.as_deref(), config);
    let timeout = Duration::from_secs(args.timeout);
    let connection = ConnectionConfig::default().connection_timeout(timeout);
    let scan = ScanOptions::default().services(services.clone());

    let label = device.clone().unwrap_or_else(|| "first matching device".to_string());
    let spinner = (!quiet).then(|| style::connecting_spinner(&label));

    let result = if device.is_none() && !services.is_empty() {
        with_retry(&RetryConfig::for_connect(), "connect", || {
            BleTransport::connect_by_service(&scan, connection.clone())
        })
        .await
    } else {
        let identifier = require_device(device)?;
        with_retry(&RetryConfig::for_connect(), "connect", || {
            BleTransport::connect_to(&identifier, &scan, connection.clone())
        })
        .await
    };

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let transport = result.with_context(|| {
        format!(
            "Failed to connect to {}\n\nPossible causes:\n  \
             - Bluetooth may be disabled\n  \
             - Device may be out of range or connected to another host\n  \
             - Identifier may be wrong -- run 'blediag scan' to verify",
            label
        )
    })?;

    let session_config = config.session_config()?;
    let session_config = if services.is_empty() {
        session_config
    } else {
        session_config.services(services)
    };
    Ok(Arc::new(ConnectionSession::with_config(
        Arc::new(transport),
        session_config,
    )))
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err().to_string();
        assert!(err.contains("No device specified"));
        assert!(err.contains("BLEDIAG_DEVICE"));
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
