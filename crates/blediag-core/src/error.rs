//! Error types for blediag-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Timeout`] | Retry | Transient BLE congestion |
//! | [`Error::Bluetooth`] | Retry, then reconnect | May be transient or link lost |
//! | [`Error::LinkInactive`] | Reconnect | The GATT link dropped |
//! | [`Error::DiscoveryFailed`] | Report | Discovery was already retried |
//! | [`Error::UnsupportedOperation`] | Do not retry | Characteristic lacks the capability |
//! | [`Error::InvalidInput`] | Do not retry | Fix the input |
//! | [`Error::NotFound`] | Do not retry | Wrong UUID or device not in range |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! Decoding never produces an error. A value that cannot be shown in the
//! requested format comes back as
//! [`Decoded::Degraded`](blediag_types::Decoded::Degraded) instead.
//!
//! ## Using RetryConfig
//!
//! ```ignore
//! use blediag_core::{RetryConfig, with_retry};
//!
//! let config = RetryConfig::new(3);
//! let sample = with_retry(&config, "read", || async {
//!     session.read(&target, Format::Hex).await
//! }).await?;
//! ```

use std::time::Duration;

use blediag_types::{CodecError, ParseError};
use thiserror::Error;

/// Errors that can occur while talking to a peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable transport: adapter missing, powered off, or permission denied.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The logical GATT link is not active.
    #[error("Link inactive")]
    LinkInactive,

    /// Service discovery kept failing until the attempt budget ran out.
    #[error("Service discovery failed after {attempts} attempt(s): {source}")]
    DiscoveryFailed {
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        source: Box<Error>,
    },

    /// The characteristic does not advertise a capability the operation needs.
    #[error("Unsupported operation: {operation} on {characteristic}")]
    UnsupportedOperation {
        /// The operation attempted (`write`, `notify`, ...).
        operation: &'static str,
        /// The characteristic UUID.
        characteristic: String,
    },

    /// User input could not be encoded.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] CodecError),

    /// A UUID or format name could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A device, service or characteristic was not found.
    #[error("Not found: {0}")]
    NotFound(NotFoundKind),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// What could not be found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundKind {
    /// No peripheral matched the identifier.
    Device { identifier: String },
    /// The peripheral has no such primary service.
    Service { uuid: String },
    /// The service has no such characteristic.
    Characteristic { service: String, uuid: String },
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device { identifier } => write!(f, "device '{}'", identifier),
            Self::Service { uuid } => write!(f, "service {}", uuid),
            Self::Characteristic { service, uuid } => {
                write!(f, "characteristic {} in service {}", uuid, service)
            }
        }
    }
}

impl Error {
    /// Create a device not found error.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound(NotFoundKind::Device {
            identifier: identifier.into(),
        })
    }

    /// Create a service not found error.
    pub fn service_not_found(uuid: impl std::fmt::Display) -> Self {
        Self::NotFound(NotFoundKind::Service {
            uuid: uuid.to_string(),
        })
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(
        service: impl std::fmt::Display,
        uuid: impl std::fmt::Display,
    ) -> Self {
        Self::NotFound(NotFoundKind::Characteristic {
            service: service.to_string(),
            uuid: uuid.to_string(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: &'static str, characteristic: impl std::fmt::Display) -> Self {
        Self::UnsupportedOperation {
            operation,
            characteristic: characteristic.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a transport unavailable error.
    pub fn transport_unavailable(message: impl Into<String>) -> Self {
        Self::TransportUnavailable(message.into())
    }
}

/// Result type alias using blediag-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
