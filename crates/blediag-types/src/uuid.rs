//! Bluetooth UUID parsing and well-known identifiers.
//!
//! Users type service and characteristic identifiers either as canonical
//! 128-bit strings or as `0x`-prefixed 16/32-bit shorthands. Both forms are
//! normalized onto a [`Uuid`] so they compare equal when they denote the same
//! attribute.

use uuid::{Uuid, uuid};

use crate::error::{ParseError, ParseResult};

/// The Bluetooth SIG base UUID that 16- and 32-bit shorthands expand onto.
pub const BLUETOOTH_BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- Serial-style module UUIDs ---
//
// Cheap BLE UART modules expose one vendor service (0xFFE0) whose
// characteristics carry firmware-defined roles. The default auto-format
// table and the ADC decoder key off these suffixes.

/// Vendor service of HM-10 style modules.
pub const FFE0_SERVICE: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");

/// Data characteristic (byte counter / raw byte).
pub const FFE1_CHARACTERISTIC: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

/// ADC frame characteristic (four 16-bit big-endian channels).
pub const FFE3_CHARACTERISTIC: Uuid = uuid!("0000ffe3-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Expand a 16- or 32-bit assigned number onto the Bluetooth base UUID.
///
/// ```
/// use blediag_types::uuid::{from_short, FFE1_CHARACTERISTIC};
///
/// assert_eq!(from_short(0xFFE1), FFE1_CHARACTERISTIC);
/// ```
#[must_use]
pub fn from_short(value: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | (u128::from(value) << 96))
}

/// Normalize a user-entered identifier into a [`Uuid`].
///
/// Accepts:
/// - `0x`-prefixed shorthands of 1–8 hex digits (`0xffe1`, `0x2A19`)
/// - canonical hyphenated or simple 128-bit strings, in any case
///
/// Surrounding whitespace is ignored.
///
/// ```
/// use blediag_types::uuid::parse_uuid;
///
/// let short = parse_uuid("0xFFE0").unwrap();
/// let long = parse_uuid("0000FFE0-0000-1000-8000-00805F9B34FB").unwrap();
/// assert_eq!(short, long);
/// assert!(parse_uuid("ffe0-nope").is_err());
/// ```
pub fn parse_uuid(input: &str) -> ParseResult<Uuid> {
    let trimmed = input.trim();

    if let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        if digits.is_empty() || digits.len() > 8 || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ParseError::InvalidUuid(input.to_string()));
        }
        return u32::from_str_radix(digits, 16)
            .map(from_short)
            .map_err(|_| ParseError::InvalidUuid(input.to_string()));
    }

    Uuid::parse_str(trimmed).map_err(|_| ParseError::InvalidUuid(input.to_string()))
}

/// Return the 16-bit assigned number if the UUID sits on the base UUID.
#[must_use]
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let prefix = value >> 96;
    let suffix = value & ((1u128 << 96) - 1);
    if suffix == BLUETOOTH_BASE_UUID.as_u128() && prefix <= u128::from(u16::MAX) {
        Some(prefix as u16)
    } else {
        None
    }
}

/// Lowercase hyphenated form used for substring heuristics.
#[must_use]
pub fn identifier_string(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}
