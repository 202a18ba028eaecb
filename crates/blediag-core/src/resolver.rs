//! Service and characteristic resolution.
//!
//! Discovery right after a (re)connect is the least reliable GATT step:
//! stacks report services late, or drop the link mid-discovery. Service
//! resolution therefore retries on a fixed delay and reconnects between
//! attempts when the link went down. Characteristic lookup is a single
//! attempt.

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use blediag_types::CharacteristicRef;

use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::session::ConnectionSession;
use crate::transport::{CharacteristicInfo, ServiceInfo};

/// A primary service with its characteristics, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub service: ServiceInfo,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Service {}", self.service.uuid)?;
        for characteristic in &self.characteristics {
            writeln!(
                f,
                "  Characteristic {} {}",
                characteristic.uuid, characteristic.capabilities
            )?;
        }
        Ok(())
    }
}

impl ConnectionSession {
    /// Resolve the peripheral's primary services.
    ///
    /// Makes up to `max_attempts` attempts, `delay` apart. Each attempt runs
    /// the connection guard with the discovery settle delay, then lists the
    /// services in bulk, or looks up each configured service when the
    /// transport cannot list them.
    ///
    /// # Errors
    ///
    /// [`Error::DiscoveryFailed`] carrying the last failure once every
    /// attempt failed.
    pub async fn resolve_services(
        &self,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<Vec<ServiceInfo>> {
        self.resolve_services_with(&RetryConfig::fixed(max_attempts, delay))
            .await
    }

    /// [`resolve_services`](Self::resolve_services) driven by a [`RetryConfig`].
    #[tracing::instrument(level = "debug", skip_all, fields(max_attempts = retry.max_attempts()))]
    pub async fn resolve_services_with(&self, retry: &RetryConfig) -> Result<Vec<ServiceInfo>> {
        let max_attempts = retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.discover_once().await {
                Ok(services) => {
                    if attempt > 1 {
                        info!("Service discovery succeeded on attempt {}", attempt);
                    }
                    debug!("Resolved {} primary service(s)", services.len());
                    return Ok(services);
                }
                Err(e) => e,
            };

            warn!(
                "Service discovery failed (attempt {}/{}): {}",
                attempt, max_attempts, error
            );

            if self.transport.has_link().await && !self.transport.is_connected().await {
                info!("Link dropped during discovery, reconnecting");
                if let Err(e) = self.transport.connect().await {
                    warn!("Reconnect after failed discovery did not succeed: {}", e);
                }
            }

            if attempt >= max_attempts {
                return Err(Error::DiscoveryFailed {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
            sleep(retry.delay_for_attempt(attempt - 1)).await;
        }
    }

    async fn discover_once(&self) -> Result<Vec<ServiceInfo>> {
        self.ensure(self.config.discovery_settle).await?;

        if self.transport.supports_bulk_discovery() {
            return self.transport.primary_services().await;
        }

        let mut services = Vec::with_capacity(self.config.services.len());
        let mut first_missing = None;
        for uuid in &self.config.services {
            match self.transport.primary_service(*uuid).await {
                Ok(service) => services.push(service),
                Err(Error::NotFound(kind)) => {
                    debug!("Configured service not present: {}", kind);
                    first_missing.get_or_insert(*uuid);
                }
                Err(e) => return Err(e),
            }
        }

        match (services.is_empty(), first_missing) {
            (true, Some(uuid)) => Err(Error::service_not_found(uuid)),
            (true, None) => Err(Error::invalid_config(
                "no services configured and the transport cannot list services",
            )),
            _ => Ok(services),
        }
    }

    /// Look up one characteristic. Not retried.
    #[tracing::instrument(level = "debug", skip(self), fields(target = %target))]
    pub async fn resolve_characteristic(
        &self,
        target: &CharacteristicRef,
    ) -> Result<CharacteristicInfo> {
        self.transport.characteristic(target).await
    }

    /// Resolve every primary service and list its characteristics.
    pub async fn describe_services(&self, retry: &RetryConfig) -> Result<Vec<ServiceDescription>> {
        let services = self.resolve_services_with(retry).await?;
        let mut descriptions = Vec::with_capacity(services.len());
        for service in services {
            let characteristics = self.transport.characteristics(service.uuid).await?;
            descriptions.push(ServiceDescription {
                service,
                characteristics,
            });
        }
        Ok(descriptions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::Capabilities;
    use blediag_types::uuids::{BATTERY_SERVICE, FFE0_SERVICE, FFE1_CHARACTERISTIC};

    #[tokio::test]
    async fn test_resolve_services_bulk() {
        let mock = Arc::new(MockTransport::serial_module());
        let session = ConnectionSession::new(mock.clone());

        let services = session.resolve_services(3, Duration::ZERO).await.unwrap();
        assert_eq!(services, vec![ServiceInfo { uuid: FFE0_SERVICE }]);
        assert_eq!(mock.discovery_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_services_retries_on_fixed_delay() {
        let mock = Arc::new(MockTransport::serial_module());
        mock.set_discovery_failures(2);
        let session = ConnectionSession::new(mock.clone());

        let start = tokio::time::Instant::now();
        let services = session
            .resolve_services(3, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(mock.discovery_count(), 3);
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_resolve_services_exhaustion() {
        let mock = Arc::new(MockTransport::serial_module());
        mock.set_discovery_failures(5);
        let session = ConnectionSession::new(mock.clone());

        let result = session.resolve_services(2, Duration::ZERO).await;
        match result {
            Err(Error::DiscoveryFailed { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, Error::Timeout { .. }));
            }
            other => panic!("expected DiscoveryFailed, got {:?}", other),
        }
        assert_eq!(mock.discovery_count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_services_reconnects_dropped_link() {
        let mock = Arc::new(MockTransport::serial_module());
        mock.set_discovery_failures(1);
        mock.set_drop_link_on_failure(true);
        let session = ConnectionSession::with_config(
            mock.clone(),
            crate::session::SessionConfig::default().discovery_settle(Duration::ZERO),
        );

        session.resolve_services(2, Duration::ZERO).await.unwrap();
        assert!(mock.connect_count() >= 1);
        assert!(mock.is_connected_now());
    }

    #[tokio::test]
    async fn test_resolve_services_per_uuid_without_bulk() {
        let mock = Arc::new(MockTransport::builder().bulk_discovery(false).build());
        mock.add_characteristic(CharacteristicInfo {
            service: FFE0_SERVICE,
            uuid: FFE1_CHARACTERISTIC,
            capabilities: Capabilities::ALL,
        });
        let config = crate::session::SessionConfig::default()
            .services(vec![BATTERY_SERVICE, FFE0_SERVICE]);
        let session = ConnectionSession::with_config(mock.clone(), config);

        let services = session.resolve_services(1, Duration::ZERO).await.unwrap();
        assert_eq!(services, vec![ServiceInfo { uuid: FFE0_SERVICE }]);
    }

    #[tokio::test]
    async fn test_resolve_characteristic_not_found() {
        let mock = Arc::new(MockTransport::serial_module());
        let session = ConnectionSession::new(mock);

        let target = CharacteristicRef::parse("0xffe0", "0xfff9").unwrap();
        let result = session.resolve_characteristic(&target).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_describe_services() {
        let mock = Arc::new(MockTransport::serial_module());
        let session = ConnectionSession::new(mock);

        let descriptions = session
            .describe_services(&RetryConfig::none())
            .await
            .unwrap();
        assert_eq!(descriptions.len(), 1);
        let text = descriptions[0].to_string();
        assert!(text.contains("0000ffe0-0000-1000-8000-00805f9b34fb"));
        assert!(text.contains("[READ, WRITE, WRITE_WITHOUT_RESPONSE, NOTIFY]"));
    }
}
