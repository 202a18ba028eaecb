//! Peripheral discovery and scanning.
//!
//! Scans list every advertising peripheral, optionally narrowed to those
//! advertising one of a set of services. [`find_device_with_options`] looks
//! a single peripheral up by name, address or peripheral ID.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::{address_matches, create_identifier, format_peripheral_id};

/// Scan attempts made by [`find_device_with_options`].
const FIND_ATTEMPTS: u32 = 3;

/// A peripheral seen during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Advertised local name.
    pub name: Option<String>,
    /// The peripheral ID for connecting.
    pub id: PeripheralId,
    /// The BLE address as a string (zeros on macOS, use `identifier` there).
    pub address: String,
    /// Peripheral ID on macOS, address elsewhere.
    pub identifier: String,
    pub rssi: Option<i16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan.
    pub duration: Duration,
    /// Only keep peripherals advertising at least one of these services.
    /// Empty keeps everything.
    pub services: Vec<Uuid>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            services: Vec::new(),
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Keep only peripherals advertising one of `services`.
    #[must_use]
    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }
}

/// Whether a peripheral advertising `advertised` passes a service filter.
pub fn advertises_any(advertised: &[Uuid], wanted: &[Uuid]) -> bool {
    wanted.is_empty() || wanted.iter().any(|uuid| advertised.contains(uuid))
}

/// Whether a peripheral matches a user-supplied identifier.
///
/// Matches the peripheral ID (substring), the address (exact, colons
/// optional) or the name (substring), all case-insensitively.
pub fn identifier_matches(
    identifier: &str,
    peripheral_id: &str,
    address: &str,
    name: Option<&str>,
) -> bool {
    let needle = identifier.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    peripheral_id.to_lowercase().contains(&needle)
        || address_matches(address, identifier)
        || name.is_some_and(|n| n.to_lowercase().contains(&needle))
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::transport_unavailable("no Bluetooth adapter found"))
}

/// Scan with default options.
pub async fn scan_for_devices() -> Result<Vec<DiscoveredDevice>> {
    scan_with_options(ScanOptions::default()).await
}

/// Scan with custom options.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, &options).await
}

/// Scan using a specific adapter.
#[tracing::instrument(level = "debug", skip_all, fields(duration_ms = options.duration.as_millis() as u64))]
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: &ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match describe_peripheral(&peripheral).await {
            Ok(Some(device)) if advertises_any(&device.services, &options.services) => {
                debug!("Found {:?} ({})", device.name, device.identifier);
                discovered.push(device);
            }
            Ok(_) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn describe_peripheral(peripheral: &Peripheral) -> Result<Option<DiscoveredDevice>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);

    Ok(Some(DiscoveredDevice {
        name: properties.local_name.clone(),
        id,
        address,
        identifier,
        rssi: properties.rssi,
        services: advertised_services(&properties),
    }))
}

fn advertised_services(properties: &PeripheralProperties) -> Vec<Uuid> {
    let mut services = properties.services.clone();
    for uuid in properties.service_data.keys() {
        if !services.contains(uuid) {
            services.push(*uuid);
        }
    }
    services
}

/// Find a peripheral by name, address or peripheral ID.
pub async fn find_device(identifier: &str) -> Result<(Adapter, Peripheral)> {
    find_device_with_options(identifier, &ScanOptions::default()).await
}

/// Find a peripheral with custom options.
///
/// Peripherals the adapter already knows are checked first. Otherwise up to
/// three scans of increasing length are made, since advertisements are
/// easily missed.
#[tracing::instrument(level = "info", skip(options))]
pub async fn find_device_with_options(
    identifier: &str,
    options: &ScanOptions,
) -> Result<(Adapter, Peripheral)> {
    let adapter = get_adapter().await?;

    if let Some(peripheral) = find_known_peripheral(&adapter, identifier, options).await? {
        info!("Found device in cache (no scan needed)");
        return Ok((adapter, peripheral));
    }

    let base_duration = (options.duration / 2).max(Duration::from_secs(2));
    for attempt in 1..=FIND_ATTEMPTS {
        let scan_duration = base_duration * attempt;
        info!(
            "Scan attempt {}/{} ({}s)...",
            attempt,
            FIND_ATTEMPTS,
            scan_duration.as_secs()
        );

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = find_known_peripheral(&adapter, identifier, options).await? {
            info!("Found device on attempt {}", attempt);
            return Ok((adapter, peripheral));
        }
        if attempt < FIND_ATTEMPTS {
            warn!("Device not found, retrying...");
        }
    }

    warn!(
        "Device not found after {} attempts: {}",
        FIND_ATTEMPTS, identifier
    );
    Err(Error::device_not_found(identifier))
}

/// Find the first peripheral advertising one of `options.services`.
pub async fn find_by_service(options: &ScanOptions) -> Result<(Adapter, Peripheral)> {
    if options.services.is_empty() {
        return Err(Error::invalid_config(
            "a device name, address or service filter is required",
        ));
    }
    let adapter = get_adapter().await?;
    let devices = scan_with_adapter(&adapter, options).await?;
    let Some(device) = devices.into_iter().next() else {
        return Err(Error::device_not_found(format!(
            "any device advertising {:?}",
            options.services
        )));
    };
    let peripheral = adapter.peripheral(&device.id).await?;
    Ok((adapter, peripheral))
}

async fn find_known_peripheral(
    adapter: &Adapter,
    identifier: &str,
    options: &ScanOptions,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        let peripheral_id = format_peripheral_id(&peripheral.id());
        let address = properties.address.to_string();
        if identifier_matches(
            identifier,
            &peripheral_id,
            &address,
            properties.local_name.as_deref(),
        ) && advertises_any(&advertised_services(&properties), &options.services)
        {
            debug!("Matched {} ({})", identifier, peripheral_id);
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blediag_types::uuids::{BATTERY_SERVICE, FFE0_SERVICE};

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new()
            .duration_secs(10)
            .services(vec![FFE0_SERVICE]);
        assert_eq!(options.duration, Duration::from_secs(10));
        assert_eq!(options.services, vec![FFE0_SERVICE]);
    }

    #[test]
    fn test_service_filter() {
        assert!(advertises_any(&[], &[]));
        assert!(advertises_any(&[FFE0_SERVICE], &[BATTERY_SERVICE, FFE0_SERVICE]));
        assert!(!advertises_any(&[BATTERY_SERVICE], &[FFE0_SERVICE]));
        assert!(!advertises_any(&[], &[FFE0_SERVICE]));
    }

    #[test]
    fn test_identifier_matching() {
        let id = "a1b2c3d4-0000-1111-2222-333344445555";
        let address = "AA:BB:CC:DD:EE:FF";

        assert!(identifier_matches("HMSoft", id, address, Some("HMSoft")));
        assert!(identifier_matches("hmso", id, address, Some("HMSoft")));
        assert!(identifier_matches("aabbccddeeff", id, address, None));
        assert!(identifier_matches("A1B2C3D4", id, address, None));
        assert!(!identifier_matches("other", id, address, Some("HMSoft")));
        assert!(!identifier_matches("", id, address, Some("HMSoft")));
    }
}
