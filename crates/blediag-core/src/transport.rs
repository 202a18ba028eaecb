//! The transport boundary.
//!
//! [`Transport`] abstracts the GATT operations blediag needs so that the
//! session, resolver, and poll scheduler run the same way against a real
//! adapter ([`BleTransport`](crate::device::BleTransport)) and against
//! [`MockTransport`](crate::mock::MockTransport) in tests.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use blediag_types::CharacteristicRef;

use crate::error::Result;

/// Raw value-change notifications for one characteristic.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// GATT properties advertised by a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl Capabilities {
    /// Read-only characteristic.
    pub const READ: Capabilities = Capabilities {
        read: true,
        write: false,
        write_without_response: false,
        notify: false,
        indicate: false,
    };

    /// Notify-only characteristic.
    pub const NOTIFY: Capabilities = Capabilities {
        read: false,
        write: false,
        write_without_response: false,
        notify: true,
        indicate: false,
    };

    /// Read, write and notify: the profile of a serial-style data characteristic.
    pub const ALL: Capabilities = Capabilities {
        read: true,
        write: true,
        write_without_response: true,
        notify: true,
        indicate: true,
    };

    /// Whether value changes can be pushed (notify or indicate).
    pub fn can_push(&self) -> bool {
        self.notify || self.indicate
    }

    /// Whether any write primitive is advertised.
    pub fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }

    /// Names of the advertised properties, in GATT order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.read {
            names.push("READ");
        }
        if self.write {
            names.push("WRITE");
        }
        if self.write_without_response {
            names.push("WRITE_WITHOUT_RESPONSE");
        }
        if self.notify {
            names.push("NOTIFY");
        }
        if self.indicate {
            names.push("INDICATE");
        }
        names
    }
}

impl fmt::Display for Capabilities {
    /// Renders as `[READ, WRITE, NOTIFY]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

/// The low-level write primitive used for one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WritePrimitive {
    /// Acknowledged write request.
    WithResponse,
    /// Write command, no acknowledgement.
    WithoutResponse,
    /// The platform's default write, for stacks that do not report properties.
    Generic,
}

impl fmt::Display for WritePrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePrimitive::WithResponse => write!(f, "with-response"),
            WritePrimitive::WithoutResponse => write!(f, "without-response"),
            WritePrimitive::Generic => write!(f, "generic"),
        }
    }
}

/// A primary service on the connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    pub uuid: Uuid,
}

/// A resolved characteristic handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicInfo {
    /// Owning service.
    pub service: Uuid,
    pub uuid: Uuid,
    pub capabilities: Capabilities,
}

impl CharacteristicInfo {
    /// The (service, characteristic) pair this handle resolves.
    pub fn target(&self) -> CharacteristicRef {
        CharacteristicRef::new(self.service, self.uuid)
    }
}

/// GATT operations against one peripheral.
///
/// # Example
///
/// ```ignore
/// use blediag_core::{Transport, Result};
///
/// async fn dump<T: Transport + ?Sized>(transport: &T) -> Result<()> {
///     for service in transport.primary_services().await? {
///         println!("{}", service.uuid);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    // --- Link ---

    /// Whether a peripheral has been selected at all.
    ///
    /// When this is `false` the connection guard has nothing to reconnect
    /// and lets operations proceed (and fail) on their own.
    async fn has_link(&self) -> bool;

    /// Whether the GATT link is currently active.
    async fn is_connected(&self) -> bool;

    /// Establish (or re-establish) the GATT link.
    async fn connect(&self) -> Result<()>;

    /// Tear down the GATT link.
    async fn disconnect(&self) -> Result<()>;

    // --- Discovery ---

    /// Whether [`primary_services`](Self::primary_services) is available.
    ///
    /// Some stacks only resolve services that were named up front; the
    /// resolver then looks each configured service up individually.
    fn supports_bulk_discovery(&self) -> bool {
        true
    }

    /// List every primary service.
    async fn primary_services(&self) -> Result<Vec<ServiceInfo>>;

    /// Look up one primary service.
    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceInfo>;

    /// List the characteristics of a service.
    async fn characteristics(&self, service: Uuid) -> Result<Vec<CharacteristicInfo>>;

    /// Look up one characteristic.
    async fn characteristic(&self, target: &CharacteristicRef) -> Result<CharacteristicInfo>;

    // --- Values ---

    /// Read the current value.
    async fn read(&self, characteristic: &CharacteristicInfo) -> Result<Vec<u8>>;

    /// Write a value with the given primitive.
    async fn write(
        &self,
        characteristic: &CharacteristicInfo,
        data: &[u8],
        primitive: WritePrimitive,
    ) -> Result<()>;

    /// Whether [`WritePrimitive::Generic`] can be used.
    fn supports_generic_write(&self) -> bool {
        true
    }

    /// Start notifications and return the value-change stream.
    async fn subscribe(&self, characteristic: &CharacteristicInfo) -> Result<NotificationStream>;

    /// Stop notifications.
    async fn unsubscribe(&self, characteristic: &CharacteristicInfo) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_display() {
        let caps = Capabilities {
            read: true,
            write: true,
            notify: true,
            ..Default::default()
        };
        assert_eq!(caps.to_string(), "[READ, WRITE, NOTIFY]");
        assert_eq!(Capabilities::default().to_string(), "[]");
    }

    #[test]
    fn test_capability_helpers() {
        assert!(Capabilities::NOTIFY.can_push());
        assert!(!Capabilities::READ.can_push());
        assert!(!Capabilities::READ.can_write());
        let caps = Capabilities {
            write_without_response: true,
            ..Default::default()
        };
        assert!(caps.can_write());
    }

    #[test]
    fn test_characteristic_target() {
        let info = CharacteristicInfo {
            service: blediag_types::uuids::FFE0_SERVICE,
            uuid: blediag_types::uuids::FFE1_CHARACTERISTIC,
            capabilities: Capabilities::ALL,
        };
        assert_eq!(
            info.target(),
            CharacteristicRef::parse("0xffe0", "0xffe1").unwrap()
        );
    }
}
