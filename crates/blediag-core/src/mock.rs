//! Mock transport implementation for testing.
//!
//! This module provides an in-memory GATT peripheral that can be used for
//! unit testing without requiring actual BLE hardware.
//!
//! The [`MockTransport`] implements the [`Transport`] trait, so a
//! [`ConnectionSession`](crate::ConnectionSession) runs against it exactly as
//! it does against a real adapter.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connects, discoveries or reads
//! - **Latency simulation**: delay reads to simulate slow BLE responses
//! - **Link drops**: drop the link when a discovery fails
//! - **Notifications**: push values to subscribers with [`MockTransport::notify`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use uuid::Uuid;

use blediag_types::CharacteristicRef;
use blediag_types::uuids::{FFE0_SERVICE, FFE1_CHARACTERISTIC, FFE3_CHARACTERISTIC};

use crate::error::{Error, Result};
use crate::transport::{
    Capabilities, CharacteristicInfo, NotificationStream, ServiceInfo, Transport, WritePrimitive,
};

/// Timeout reported by injected discovery failures.
const INJECTED_TIMEOUT: Duration = Duration::from_secs(10);

/// One write seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub target: CharacteristicRef,
    pub data: Vec<u8>,
    pub primitive: WritePrimitive,
}

/// An in-memory GATT peripheral.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use blediag_core::{ConnectionSession, MockTransport};
/// use blediag_types::{CharacteristicRef, Format};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = Arc::new(MockTransport::serial_module());
///     let target = CharacteristicRef::parse("0xffe0", "0xffe1").unwrap();
///     mock.set_value(&target, vec![0x2a]);
///
///     let session = ConnectionSession::new(mock);
///     let sample = session.read(&target, Format::Uint8).await.unwrap();
///     assert_eq!(sample.value, "42");
/// }
/// ```
pub struct MockTransport {
    linked: AtomicBool,
    connected: AtomicBool,
    bulk_discovery: bool,
    generic_write: bool,
    characteristics: Mutex<Vec<CharacteristicInfo>>,
    values: Mutex<HashMap<CharacteristicRef, Vec<u8>>>,
    writes: Mutex<Vec<RecordedWrite>>,
    subscribers: Mutex<HashMap<CharacteristicRef, Vec<UnboundedSender<Vec<u8>>>>>,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    connect_failures: AtomicU32,
    discovery_failures: AtomicU32,
    read_failures: AtomicU32,
    drop_link_on_failure: AtomicBool,
    connect_count: AtomicU32,
    discovery_count: AtomicU32,
    read_count: AtomicU32,
    subscribe_count: AtomicU32,
    unsubscribe_count: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("linked", &self.linked.load(Ordering::Relaxed))
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("characteristics", &lock(&self.characteristics).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrement `counter` if non-zero. Returns whether it was.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A linked, connected peripheral with no services.
    pub fn new() -> Self {
        MockTransportBuilder::new().build()
    }

    /// Create a builder.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    /// A typical BLE serial module.
    ///
    /// Service `0xFFE0` with the `0xFFE1` data characteristic
    /// (read, write, write without response, notify) and the `0xFFE3` ADC
    /// characteristic (read, notify).
    pub fn serial_module() -> Self {
        MockTransportBuilder::new()
            .characteristic(CharacteristicInfo {
                service: FFE0_SERVICE,
                uuid: FFE1_CHARACTERISTIC,
                capabilities: Capabilities {
                    read: true,
                    write: true,
                    write_without_response: true,
                    notify: true,
                    indicate: false,
                },
            })
            .characteristic(CharacteristicInfo {
                service: FFE0_SERVICE,
                uuid: FFE3_CHARACTERISTIC,
                capabilities: Capabilities {
                    read: true,
                    notify: true,
                    ..Default::default()
                },
            })
            .build()
    }

    // --- State ---

    /// Add a characteristic (and implicitly its service).
    pub fn add_characteristic(&self, info: CharacteristicInfo) {
        let mut characteristics = lock(&self.characteristics);
        characteristics.retain(|c| c.target() != info.target());
        characteristics.push(info);
    }

    /// Set the value returned by reads.
    pub fn set_value(&self, target: &CharacteristicRef, value: Vec<u8>) {
        lock(&self.values).insert(*target, value);
    }

    /// Push a value-change notification to every subscriber of `target`.
    ///
    /// Returns the number of subscribers reached.
    pub fn notify(&self, target: &CharacteristicRef, value: Vec<u8>) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let Some(senders) = subscribers.get_mut(target) else {
            return 0;
        };
        senders.retain(|tx| tx.unbounded_send(value.clone()).is_ok());
        senders.len()
    }

    /// Drop the link as if the peripheral went out of range.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Whether the link is up right now.
    pub fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Every write so far, oldest first.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.writes).clone()
    }

    // --- Failure injection ---

    /// Fail the next `count` connects with [`Error::LinkInactive`].
    pub fn set_connect_failures(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` service discoveries with a timeout.
    pub fn set_discovery_failures(&self, count: u32) {
        self.discovery_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` reads with [`Error::LinkInactive`].
    pub fn set_read_failures(&self, count: u32) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Drop the link whenever an injected discovery failure fires.
    pub fn set_drop_link_on_failure(&self, drop: bool) {
        self.drop_link_on_failure.store(drop, Ordering::SeqCst);
    }

    /// Set simulated read latency.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    // --- Counters ---

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn discovery_count(&self) -> u32 {
        self.discovery_count.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    fn check_link(&self) -> Result<()> {
        if !self.linked.load(Ordering::SeqCst) {
            return Err(Error::transport_unavailable("no peripheral selected"));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::LinkInactive);
        }
        Ok(())
    }

    fn discovery_attempt(&self) -> Result<()> {
        self.discovery_count.fetch_add(1, Ordering::SeqCst);
        self.check_link()?;
        if take_failure(&self.discovery_failures) {
            if self.drop_link_on_failure.load(Ordering::SeqCst) {
                self.drop_link();
            }
            return Err(Error::timeout("service discovery", INJECTED_TIMEOUT));
        }
        Ok(())
    }

    fn service_uuids(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = Vec::new();
        for c in lock(&self.characteristics).iter() {
            if !uuids.contains(&c.service) {
                uuids.push(c.service);
            }
        }
        uuids
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn has_link(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.connect_failures) {
            return Err(Error::LinkInactive);
        }
        self.linked.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.subscribers).clear();
        Ok(())
    }

    fn supports_bulk_discovery(&self) -> bool {
        self.bulk_discovery
    }

    async fn primary_services(&self) -> Result<Vec<ServiceInfo>> {
        if !self.bulk_discovery {
            return Err(Error::unsupported("list services", "all"));
        }
        self.discovery_attempt()?;
        Ok(self
            .service_uuids()
            .into_iter()
            .map(|uuid| ServiceInfo { uuid })
            .collect())
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceInfo> {
        self.discovery_attempt()?;
        if self.service_uuids().contains(&uuid) {
            Ok(ServiceInfo { uuid })
        } else {
            Err(Error::service_not_found(uuid))
        }
    }

    async fn characteristics(&self, service: Uuid) -> Result<Vec<CharacteristicInfo>> {
        self.check_link()?;
        let found: Vec<CharacteristicInfo> = lock(&self.characteristics)
            .iter()
            .filter(|c| c.service == service)
            .copied()
            .collect();
        if found.is_empty() {
            return Err(Error::service_not_found(service));
        }
        Ok(found)
    }

    async fn characteristic(&self, target: &CharacteristicRef) -> Result<CharacteristicInfo> {
        self.check_link()?;
        lock(&self.characteristics)
            .iter()
            .find(|c| c.target() == *target)
            .copied()
            .ok_or_else(|| Error::characteristic_not_found(target.service, target.characteristic))
    }

    async fn read(&self, characteristic: &CharacteristicInfo) -> Result<Vec<u8>> {
        self.check_link()?;

        let latency = self.read_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.read_count.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.read_failures) {
            return Err(Error::LinkInactive);
        }

        Ok(lock(&self.values)
            .get(&characteristic.target())
            .cloned()
            .unwrap_or_default())
    }

    async fn write(
        &self,
        characteristic: &CharacteristicInfo,
        data: &[u8],
        primitive: WritePrimitive,
    ) -> Result<()> {
        self.check_link()?;
        let target = characteristic.target();
        lock(&self.writes).push(RecordedWrite {
            target,
            data: data.to_vec(),
            primitive,
        });
        lock(&self.values).insert(target, data.to_vec());
        Ok(())
    }

    fn supports_generic_write(&self) -> bool {
        self.generic_write
    }

    async fn subscribe(&self, characteristic: &CharacteristicInfo) -> Result<NotificationStream> {
        self.check_link()?;
        if !characteristic.capabilities.can_push() {
            return Err(Error::unsupported("notify", characteristic.uuid));
        }
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded();
        lock(&self.subscribers)
            .entry(characteristic.target())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }

    async fn unsubscribe(&self, characteristic: &CharacteristicInfo) -> Result<()> {
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).remove(&characteristic.target());
        self.check_link()
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    linked: bool,
    connected: bool,
    bulk_discovery: bool,
    generic_write: bool,
    characteristics: Vec<CharacteristicInfo>,
    values: HashMap<CharacteristicRef, Vec<u8>>,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            linked: true,
            connected: true,
            bulk_discovery: true,
            generic_write: true,
            characteristics: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl MockTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a peripheral has been selected. `false` also disconnects.
    #[must_use]
    pub fn linked(mut self, linked: bool) -> Self {
        self.linked = linked;
        if !linked {
            self.connected = false;
        }
        self
    }

    #[must_use]
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Whether bulk service listing is available.
    #[must_use]
    pub fn bulk_discovery(mut self, enabled: bool) -> Self {
        self.bulk_discovery = enabled;
        self
    }

    /// Whether the generic write primitive is available.
    #[must_use]
    pub fn generic_write(mut self, enabled: bool) -> Self {
        self.generic_write = enabled;
        self
    }

    #[must_use]
    pub fn characteristic(mut self, info: CharacteristicInfo) -> Self {
        self.characteristics.push(info);
        self
    }

    /// Initial value of a characteristic.
    #[must_use]
    pub fn value(mut self, target: CharacteristicRef, value: Vec<u8>) -> Self {
        self.values.insert(target, value);
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            linked: AtomicBool::new(self.linked),
            connected: AtomicBool::new(self.connected),
            bulk_discovery: self.bulk_discovery,
            generic_write: self.generic_write,
            characteristics: Mutex::new(self.characteristics),
            values: Mutex::new(self.values),
            writes: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            read_latency_ms: AtomicU64::new(0),
            connect_failures: AtomicU32::new(0),
            discovery_failures: AtomicU32::new(0),
            read_failures: AtomicU32::new(0),
            drop_link_on_failure: AtomicBool::new(false),
            connect_count: AtomicU32::new(0),
            discovery_count: AtomicU32::new(0),
            read_count: AtomicU32::new(0),
            subscribe_count: AtomicU32::new(0),
            unsubscribe_count: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffe1() -> CharacteristicRef {
        CharacteristicRef::new(FFE0_SERVICE, FFE1_CHARACTERISTIC)
    }

    #[tokio::test]
    async fn test_serial_module_layout() {
        let mock = MockTransport::serial_module();
        let services = mock.primary_services().await.unwrap();
        assert_eq!(services, vec![ServiceInfo { uuid: FFE0_SERVICE }]);

        let characteristics = mock.characteristics(FFE0_SERVICE).await.unwrap();
        assert_eq!(characteristics.len(), 2);
        assert!(characteristics[0].capabilities.can_write());
        assert!(!characteristics[1].capabilities.can_write());
    }

    #[tokio::test]
    async fn test_read_value_and_failures() {
        let mock = MockTransport::builder()
            .characteristic(CharacteristicInfo {
                service: FFE0_SERVICE,
                uuid: FFE1_CHARACTERISTIC,
                capabilities: Capabilities::READ,
            })
            .value(ffe1(), vec![1, 2])
            .build();
        let info = mock.characteristic(&ffe1()).await.unwrap();

        mock.set_read_failures(1);
        assert!(mock.read(&info).await.is_err());
        assert_eq!(mock.read(&info).await.unwrap(), vec![1, 2]);
        assert_eq!(mock.read_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_operations_fail() {
        let mock = MockTransport::serial_module();
        mock.drop_link();
        assert!(matches!(
            mock.characteristic(&ffe1()).await,
            Err(Error::LinkInactive)
        ));

        mock.connect().await.unwrap();
        assert!(mock.characteristic(&ffe1()).await.is_ok());
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let mock = MockTransport::serial_module();
        let info = mock.characteristic(&ffe1()).await.unwrap();
        let mut stream = mock.subscribe(&info).await.unwrap();

        assert_eq!(mock.notify(&ffe1(), vec![9]), 1);
        assert_eq!(stream.next().await, Some(vec![9]));

        mock.unsubscribe(&info).await.unwrap();
        assert_eq!(stream.next().await, None);
        assert_eq!(mock.notify(&ffe1(), vec![10]), 0);
    }

    #[tokio::test]
    async fn test_injected_discovery_failure_can_drop_link() {
        let mock = MockTransport::serial_module();
        mock.set_discovery_failures(1);
        mock.set_drop_link_on_failure(true);

        assert!(matches!(
            mock.primary_services().await,
            Err(Error::Timeout { .. })
        ));
        assert!(!mock.is_connected_now());
        assert_eq!(mock.discovery_count(), 1);
    }
}
