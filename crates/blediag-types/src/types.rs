//! Core data types shared by the transport, session, and export layers.

use core::fmt;

use bytes::Bytes;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::adc::ChannelReading;
use crate::codec;
use crate::error::ParseResult;
use crate::uuid::parse_uuid;

/// A (service, characteristic) pair identifying one GATT attribute.
///
/// Comparison is by UUID value, so shorthand and canonical spellings of the
/// same attribute are equal once parsed.
///
/// ```
/// use blediag_types::CharacteristicRef;
///
/// let a = CharacteristicRef::parse("0xffe0", "0xffe1").unwrap();
/// let b = CharacteristicRef::parse(
///     "0000FFE0-0000-1000-8000-00805F9B34FB",
///     "0000ffe1-0000-1000-8000-00805f9b34fb",
/// )
/// .unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicRef {
    #[must_use]
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    /// Parse user-entered service and characteristic identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUuid`](crate::ParseError::InvalidUuid)
    /// if either identifier is malformed.
    pub fn parse(service: &str, characteristic: &str) -> ParseResult<Self> {
        Ok(Self::new(parse_uuid(service)?, parse_uuid(characteristic)?))
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// One timestamped observation of a characteristic value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Wall-clock time the value was observed.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Value decoded with the session's current format.
    pub value: String,
    /// Lowercase space-separated hex of `raw`.
    pub raw_hex: String,
    /// Bytes as received.
    pub raw: Bytes,
    /// Decoded ADC channels, when the source was an ADC characteristic.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub adc: Option<[ChannelReading; 4]>,
}

impl Sample {
    /// Create a sample; `raw_hex` is derived from `raw`.
    pub fn new(timestamp: OffsetDateTime, value: impl Into<String>, raw: Bytes) -> Self {
        Self {
            timestamp,
            value: value.into(),
            raw_hex: codec::to_hex(&raw),
            raw,
            adc: None,
        }
    }

    /// Create a sample stamped with the current UTC time.
    pub fn now(value: impl Into<String>, raw: Bytes) -> Self {
        Self::new(OffsetDateTime::now_utc(), value, raw)
    }

    /// Attach ADC channels.
    #[must_use]
    pub fn with_adc(mut self, adc: Option<[ChannelReading; 4]>) -> Self {
        self.adc = adc;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{FFE0_SERVICE, FFE1_CHARACTERISTIC};

    #[test]
    fn test_characteristic_ref_display() {
        let target = CharacteristicRef::new(FFE0_SERVICE, FFE1_CHARACTERISTIC);
        assert_eq!(
            target.to_string(),
            "0000ffe0-0000-1000-8000-00805f9b34fb/0000ffe1-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_characteristic_ref_parse_error() {
        assert!(CharacteristicRef::parse("0xffe0", "nope").is_err());
    }

    #[test]
    fn test_sample_raw_hex() {
        let sample = Sample::now("1", Bytes::from_static(&[0x01, 0xab]));
        assert_eq!(sample.raw_hex, "01 ab");
        assert!(sample.adc.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_sample_serializes_rfc3339() {
        let timestamp = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let sample = Sample::new(timestamp, "42", Bytes::from_static(&[42]));
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert_eq!(json["raw_hex"], "2a");
        assert!(json.get("adc").is_none());
    }
}
