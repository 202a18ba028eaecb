//! Four-channel ADC frame decoding.
//!
//! Some serial-style modules stream a 12-bit ADC snapshot on the `ffe3`
//! characteristic: four unsigned 16-bit big-endian words, one per channel.
//! Bytes past the first eight are ignored.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::CharacteristicRef;
use crate::uuid::identifier_string;

/// Full-scale count of a 12-bit converter.
pub const DEFAULT_FULL_SCALE: f64 = 4095.0;

/// Reference voltage of the converter, in volts.
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 3.3;

/// Number of channels in a frame.
pub const CHANNEL_COUNT: usize = 4;

/// Bytes needed for a complete frame.
pub const FRAME_LEN: usize = CHANNEL_COUNT * 2;

/// One decoded channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelReading {
    /// Channel number, starting at 1.
    pub channel: u8,
    /// Raw converter count.
    pub raw: u16,
    /// `raw / full_scale * reference_voltage`.
    pub voltage: f64,
    /// `raw / full_scale * 100`.
    pub percentage: f64,
}

/// Decoder for ADC frames with configurable scaling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdcDecoder {
    /// Identifier substring that marks an ADC characteristic.
    pub marker: String,
    pub full_scale: f64,
    pub reference_voltage: f64,
}

impl Default for AdcDecoder {
    fn default() -> Self {
        Self {
            marker: "ffe3".to_string(),
            full_scale: DEFAULT_FULL_SCALE,
            reference_voltage: DEFAULT_REFERENCE_VOLTAGE,
        }
    }
}

impl AdcDecoder {
    /// Whether the service or characteristic identifier carries the marker.
    #[must_use]
    pub fn applies_to(&self, target: &CharacteristicRef) -> bool {
        let marker = self.marker.to_ascii_lowercase();
        if marker.is_empty() {
            return false;
        }
        identifier_string(&target.service).contains(&marker)
            || identifier_string(&target.characteristic).contains(&marker)
    }

    /// Decode a frame when the target is an ADC characteristic and the
    /// buffer is long enough. Returns `None` otherwise.
    #[must_use]
    pub fn decode(&self, bytes: &[u8], target: &CharacteristicRef) -> Option<[ChannelReading; 4]> {
        if !self.applies_to(target) {
            return None;
        }
        self.decode_frame(bytes)
    }

    /// Decode a frame regardless of the characteristic it came from.
    #[must_use]
    pub fn decode_frame(&self, bytes: &[u8]) -> Option<[ChannelReading; 4]> {
        let frame = bytes.get(..FRAME_LEN)?;
        Some(core::array::from_fn(|i| {
            let raw = u16::from_be_bytes([frame[i * 2], frame[i * 2 + 1]]);
            let ratio = f64::from(raw) / self.full_scale;
            ChannelReading {
                channel: i as u8 + 1,
                raw,
                voltage: ratio * self.reference_voltage,
                percentage: ratio * 100.0,
            }
        }))
    }
}

/// Decode an ADC frame with the default 12-bit / 3.3 V scaling.
///
/// ```
/// use blediag_types::{CharacteristicRef, adc};
/// use blediag_types::uuid::{FFE0_SERVICE, FFE3_CHARACTERISTIC};
///
/// let target = CharacteristicRef::new(FFE0_SERVICE, FFE3_CHARACTERISTIC);
/// let channels = adc::try_decode_adc(&[0x0F, 0xFF, 0, 0, 0, 0, 0, 0], &target).unwrap();
/// assert_eq!(channels[0].raw, 4095);
/// assert!((channels[0].voltage - 3.3).abs() < 1e-9);
/// ```
#[must_use]
pub fn try_decode_adc(bytes: &[u8], target: &CharacteristicRef) -> Option<[ChannelReading; 4]> {
    AdcDecoder::default().decode(bytes, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{FFE0_SERVICE, FFE1_CHARACTERISTIC, FFE3_CHARACTERISTIC, parse_uuid};

    fn adc_target() -> CharacteristicRef {
        CharacteristicRef::new(FFE0_SERVICE, FFE3_CHARACTERISTIC)
    }

    #[test]
    fn test_channels_are_big_endian() {
        let channels = try_decode_adc(&[0, 1, 0, 2, 0, 3, 0, 4], &adc_target()).unwrap();
        let raws: Vec<u16> = channels.iter().map(|c| c.raw).collect();
        assert_eq!(raws, vec![1, 2, 3, 4]);

        let channels = try_decode_adc(&[1, 0, 2, 0, 3, 0, 4, 0], &adc_target()).unwrap();
        let raws: Vec<u16> = channels.iter().map(|c| c.raw).collect();
        assert_eq!(raws, vec![256, 512, 768, 1024]);
    }

    #[test]
    fn test_channel_numbering_and_scaling() {
        let channels = try_decode_adc(&[0x0f, 0xff, 0, 0, 0x08, 0x00, 0, 0], &adc_target()).unwrap();
        assert_eq!(channels[0].channel, 1);
        assert_eq!(channels[3].channel, 4);
        assert!((channels[0].percentage - 100.0).abs() < 1e-9);
        assert_eq!(channels[1].voltage, 0.0);
        assert!((channels[2].voltage - 2048.0 / 4095.0 * 3.3).abs() < 1e-9);
    }

    #[test]
    fn test_short_frame_is_none() {
        assert!(try_decode_adc(&[0; 7], &adc_target()).is_none());
    }

    #[test]
    fn test_extra_bytes_ignored() {
        let channels = try_decode_adc(&[0, 1, 0, 2, 0, 3, 0, 4, 0xff, 0xff], &adc_target()).unwrap();
        assert_eq!(channels[3].raw, 4);
    }

    #[test]
    fn test_other_characteristics_skipped() {
        let target = CharacteristicRef::new(FFE0_SERVICE, FFE1_CHARACTERISTIC);
        assert!(try_decode_adc(&[0; 8], &target).is_none());
    }

    #[test]
    fn test_marker_on_service_applies() {
        let service = parse_uuid("0000ffe3-0000-1000-8000-00805f9b34fb").unwrap();
        let target = CharacteristicRef::new(service, FFE1_CHARACTERISTIC);
        assert!(try_decode_adc(&[0; 8], &target).is_some());
    }

    #[test]
    fn test_custom_scaling() {
        let decoder = AdcDecoder {
            full_scale: 1023.0,
            reference_voltage: 5.0,
            ..AdcDecoder::default()
        };
        let channels = decoder.decode_frame(&[0x03, 0xff, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!((channels[0].voltage - 5.0).abs() < 1e-9);
    }
}
