//! Configuration file management.
//!
//! The file lives at `<config dir>/blediag/config.toml`. Every key is
//! optional; command-line flags override file values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use blediag_core::SessionConfig;
use blediag_types::uuids::{FFE0_SERVICE, FFE1_CHARACTERISTIC, parse_uuid};
use blediag_types::{AdcDecoder, AutoFormatTable, CharacteristicRef, Format};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cli::{DeviceArgs, TargetArgs};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default device name, address or peripheral ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Services used to filter scans and to look up one by one when the
    /// platform cannot list services in bulk
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,

    /// Default target service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Default target characteristic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characteristic: Option<String>,

    /// Default value format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,

    /// Default poll interval in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Guard settle delay in milliseconds after a reconnect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,

    /// Custom rules for the `auto` format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_formats: Option<AutoFormatTable>,

    /// ADC frame decoder settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc: Option<AdcDecoder>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blediag")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_or_default(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any problem.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load config from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Parse the configured service list.
    pub fn service_uuids(&self) -> Result<Vec<Uuid>> {
        parse_uuid_list(&self.services)
    }

    /// Build the session options from this file.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = SessionConfig::default();
        let services = self.service_uuids()?;
        if !services.is_empty() {
            config = config.services(services);
        }
        if let Some(table) = &self.auto_formats {
            config = config.auto_formats(table.clone());
        }
        if let Some(adc) = &self.adc {
            config = config.adc(adc.clone());
        }
        if let Some(ms) = self.settle_ms {
            config = config.settle(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

/// Parse a list of canonical or shorthand UUIDs.
pub fn parse_uuid_list(values: &[String]) -> Result<Vec<Uuid>> {
    values
        .iter()
        .map(|value| parse_uuid(value).with_context(|| format!("Invalid service '{}'", value)))
        .collect()
}

/// Resolve device from arg, env var, or config.
pub fn resolve_device(device: Option<&str>, config: &Config) -> Option<String> {
    device
        .map(str::to_string)
        .or_else(|| config.device.clone())
}

/// Service filter: flags win over the file.
pub fn resolve_services(args: &DeviceArgs, config: &Config) -> Result<Vec<Uuid>> {
    if args.services.is_empty() {
        config.service_uuids()
    } else {
        parse_uuid_list(&args.services)
    }
}

/// Resolve the target characteristic, defaulting to FFE0/FFE1.
pub fn resolve_target(args: &TargetArgs, config: &Config) -> Result<CharacteristicRef> {
    let service = match args.service.as_deref().or(config.service.as_deref()) {
        Some(value) => parse_uuid(value).with_context(|| format!("Invalid service '{}'", value))?,
        None => FFE0_SERVICE,
    };
    let characteristic = match args
        .characteristic
        .as_deref()
        .or(config.characteristic.as_deref())
    {
        Some(value) => {
            parse_uuid(value).with_context(|| format!("Invalid characteristic '{}'", value))?
        }
        None => FFE1_CHARACTERISTIC,
    };
    Ok(CharacteristicRef::new(service, characteristic))
}

/// Resolve the value format: flag, then config, then hex.
pub fn resolve_format(format: Option<Format>, config: &Config) -> Format {
    format.or(config.format).unwrap_or_default()
}

/// Resolve the poll interval: flag, then config, then one second.
pub fn resolve_interval(interval_ms: Option<u64>, config: &Config) -> Duration {
    Duration::from_millis(interval_ms.or(config.interval_ms).unwrap_or(1000))
}
