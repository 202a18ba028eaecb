//! btleplug-backed transport.
//!
//! [`BleTransport`] owns the selected peripheral and maps the [`Transport`]
//! operations onto btleplug, with a timeout around every GATT request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use futures::future;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blediag_types::CharacteristicRef;

use crate::error::{Error, Result};
use crate::scan::{ScanOptions, find_by_service, find_device_with_options};
use crate::transport::{
    Capabilities, CharacteristicInfo, NotificationStream, ServiceInfo, Transport, WritePrimitive,
};
use crate::util::{create_identifier, format_peripheral_id};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeouts applied by [`BleTransport`].
///
/// Serial modules behind walls or at the edge of range need the longer
/// values of [`ConnectionConfig::challenging_environment`].
///
/// ```no_run
/// use std::time::Duration;
/// use blediag_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .discovery_timeout(Duration::from_secs(12));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connection_timeout: Duration,
    /// Bound on a single characteristic read.
    pub read_timeout: Duration,
    /// Bound on a single write, with or without response.
    pub write_timeout: Duration,
    /// Bound on listing services and characteristics once connected.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longer timeouts for weak signals.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// Map btleplug property flags onto [`Capabilities`].
pub fn capabilities_from_flags(flags: CharPropFlags) -> Capabilities {
    Capabilities {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

fn write_type(primitive: WritePrimitive) -> WriteType {
    match primitive {
        WritePrimitive::WithoutResponse => WriteType::WithoutResponse,
        // btleplug has no separate default write
        WritePrimitive::WithResponse | WritePrimitive::Generic => WriteType::WithResponse,
    }
}

fn characteristic_info(characteristic: &Characteristic) -> CharacteristicInfo {
    CharacteristicInfo {
        service: characteristic.service_uuid,
        uuid: characteristic.uuid,
        capabilities: capabilities_from_flags(characteristic.properties),
    }
}

struct Link {
    /// Kept alive for the lifetime of the peripheral connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    identifier: String,
}

/// A [`Transport`] over a btleplug peripheral.
///
/// A transport starts without a link; [`attach`](Self::attach) (or one of
/// the `connect_*` constructors) selects the peripheral.
///
/// # Cleanup
///
/// Call [`Transport::disconnect`] before dropping. A transport dropped while
/// connected spawns a best-effort disconnect and logs a warning.
pub struct BleTransport {
    link: RwLock<Option<Link>>,
    config: ConnectionConfig,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identifier = self
            .link
            .try_read()
            .ok()
            .and_then(|link| link.as_ref().map(|l| l.identifier.clone()));
        f.debug_struct("BleTransport")
            .field("identifier", &identifier)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// A transport with no peripheral selected.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            link: RwLock::new(None),
            config,
            disconnected: AtomicBool::new(true),
        }
    }

    /// Find a peripheral by name, address or peripheral ID and connect.
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect_to(
        identifier: &str,
        scan: &ScanOptions,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let (adapter, peripheral) = find_device_with_options(identifier, scan).await?;
        Self::from_peripheral(adapter, peripheral, config).await
    }

    /// Connect to the first peripheral advertising one of `scan.services`.
    #[tracing::instrument(level = "info", skip_all, fields(services = ?scan.services))]
    pub async fn connect_by_service(scan: &ScanOptions, config: ConnectionConfig) -> Result<Self> {
        let (adapter, peripheral) = find_by_service(scan).await?;
        Self::from_peripheral(adapter, peripheral, config).await
    }

    /// Attach an already-discovered peripheral and connect.
    pub async fn from_peripheral(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let transport = Self::new(config);
        transport.attach(adapter, peripheral).await?;
        transport.connect().await?;
        Ok(transport)
    }

    /// Select the peripheral without connecting.
    pub async fn attach(&self, adapter: Adapter, peripheral: Peripheral) -> Result<()> {
        let properties = peripheral.properties().await?;
        let name = properties.as_ref().and_then(|p| p.local_name.clone());
        let identifier = properties
            .as_ref()
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));

        debug!("Attached peripheral {} ({:?})", identifier, name);
        *self.link.write().await = Some(Link {
            adapter,
            peripheral,
            name,
            identifier,
        });
        Ok(())
    }

    /// Advertised name of the selected peripheral.
    pub async fn name(&self) -> Option<String> {
        self.link.read().await.as_ref().and_then(|l| l.name.clone())
    }

    /// Address, or peripheral ID on macOS.
    pub async fn identifier(&self) -> Option<String> {
        self.link
            .read()
            .await
            .as_ref()
            .map(|l| l.identifier.clone())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn peripheral(&self) -> Result<Peripheral> {
        self.link
            .read()
            .await
            .as_ref()
            .map(|l| l.peripheral.clone())
            .ok_or_else(|| Error::transport_unavailable("no peripheral selected"))
    }

    async fn discover(&self, peripheral: &Peripheral) -> Result<()> {
        timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;
        Ok(())
    }

    /// The peripheral, with services discovered.
    async fn discovered_peripheral(&self) -> Result<Peripheral> {
        let peripheral = self.peripheral().await?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            return Err(Error::LinkInactive);
        }
        if peripheral.services().is_empty() {
            self.discover(&peripheral).await?;
        }
        Ok(peripheral)
    }

    fn find_characteristic(
        &self,
        peripheral: &Peripheral,
        service: Uuid,
        uuid: Uuid,
    ) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == uuid)
            .ok_or_else(|| Error::characteristic_not_found(service, uuid))
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn has_link(&self) -> bool {
        self.link.read().await.is_some()
    }

    async fn is_connected(&self) -> bool {
        match self.peripheral().await {
            Ok(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self) -> Result<()> {
        let peripheral = self.peripheral().await?;

        info!("Connecting to device...");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", self.config.connection_timeout))??;
        self.disconnected.store(false, Ordering::SeqCst);
        info!("Connected!");

        self.discover(&peripheral).await?;
        debug!("Found {} services", peripheral.services().len());
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn disconnect(&self) -> Result<()> {
        let peripheral = self.peripheral().await?;
        info!("Disconnecting from device...");
        self.disconnected.store(true, Ordering::SeqCst);
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn primary_services(&self) -> Result<Vec<ServiceInfo>> {
        let peripheral = self.discovered_peripheral().await?;
        Ok(peripheral
            .services()
            .into_iter()
            .filter(|s| s.primary)
            .map(|s| ServiceInfo { uuid: s.uuid })
            .collect())
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceInfo> {
        let peripheral = self.discovered_peripheral().await?;
        peripheral
            .services()
            .into_iter()
            .find(|s| s.primary && s.uuid == uuid)
            .map(|s| ServiceInfo { uuid: s.uuid })
            .ok_or_else(|| Error::service_not_found(uuid))
    }

    async fn characteristics(&self, service: Uuid) -> Result<Vec<CharacteristicInfo>> {
        let peripheral = self.discovered_peripheral().await?;
        let found = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| Error::service_not_found(service))?;
        Ok(found.characteristics.iter().map(characteristic_info).collect())
    }

    async fn characteristic(&self, target: &CharacteristicRef) -> Result<CharacteristicInfo> {
        let peripheral = self.discovered_peripheral().await?;
        let characteristic = self
            .find_characteristic(&peripheral, target.service, target.characteristic)?;
        Ok(characteristic_info(&characteristic))
    }

    async fn read(&self, characteristic: &CharacteristicInfo) -> Result<Vec<u8>> {
        let peripheral = self.peripheral().await?;
        let handle = self
            .find_characteristic(&peripheral, characteristic.service, characteristic.uuid)?;
        let data = timeout(self.config.read_timeout, peripheral.read(&handle))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {}", characteristic.uuid),
                    self.config.read_timeout,
                )
            })??;
        Ok(data)
    }

    async fn write(
        &self,
        characteristic: &CharacteristicInfo,
        data: &[u8],
        primitive: WritePrimitive,
    ) -> Result<()> {
        let peripheral = self.peripheral().await?;
        let handle = self
            .find_characteristic(&peripheral, characteristic.service, characteristic.uuid)?;
        timeout(
            self.config.write_timeout,
            peripheral.write(&handle, data, write_type(primitive)),
        )
        .await
        .map_err(|_| {
            Error::timeout(
                format!("write characteristic {}", characteristic.uuid),
                self.config.write_timeout,
            )
        })??;
        Ok(())
    }

    fn supports_generic_write(&self) -> bool {
        false
    }

    async fn subscribe(&self, characteristic: &CharacteristicInfo) -> Result<NotificationStream> {
        let peripheral = self.peripheral().await?;
        let handle = self
            .find_characteristic(&peripheral, characteristic.service, characteristic.uuid)?;

        peripheral.subscribe(&handle).await?;
        let uuid = handle.uuid;
        let stream = peripheral
            .notifications()
            .await?
            .filter_map(move |n| future::ready((n.uuid == uuid).then_some(n.value)));
        Ok(stream.boxed())
    }

    async fn unsubscribe(&self, characteristic: &CharacteristicInfo) -> Result<()> {
        let peripheral = self.peripheral().await?;
        let handle = self
            .find_characteristic(&peripheral, characteristic.service, characteristic.uuid)?;
        peripheral.unsubscribe(&handle).await?;
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(link) = self.link.get_mut().take() else {
            return;
        };

        warn!(
            device = %link.identifier,
            "Transport dropped without calling disconnect() - performing best-effort cleanup"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let peripheral = link.peripheral.clone();
            runtime.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_flags() {
        let caps = capabilities_from_flags(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert_eq!(caps.to_string(), "[READ, NOTIFY]");

        let caps = capabilities_from_flags(
            CharPropFlags::WRITE_WITHOUT_RESPONSE | CharPropFlags::INDICATE,
        );
        assert!(caps.write_without_response && caps.indicate);
        assert!(!caps.read && !caps.write && !caps.notify);
    }

    #[test]
    fn test_generic_write_maps_to_with_response() {
        assert!(matches!(
            write_type(WritePrimitive::Generic),
            WriteType::WithResponse
        ));
        assert!(matches!(
            write_type(WritePrimitive::WithoutResponse),
            WriteType::WithoutResponse
        ));
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::default()
            .connection_timeout(Duration::from_secs(20))
            .read_timeout(Duration::from_secs(3));
        assert_eq!(config.connection_timeout, Duration::from_secs(20));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_new_transport_has_no_link() {
        let transport = BleTransport::new(ConnectionConfig::default());
        assert!(!transport.has_link().await);
        assert!(!transport.is_connected().await);
        assert!(matches!(
            transport.connect().await,
            Err(Error::TransportUnavailable(_))
        ));
    }
}
