//! Peripheral identifier helpers.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the MAC address (macOS).
pub const PLACEHOLDER_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// The identifier to show and connect by: the address, or the peripheral ID
/// when the platform hides the address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == PLACEHOLDER_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether `identifier` names the Bluetooth `address`.
///
/// Case-insensitive; colons are optional. The placeholder address never
/// matches.
pub fn address_matches(address: &str, identifier: &str) -> bool {
    if address == PLACEHOLDER_ADDRESS || identifier.is_empty() {
        return false;
    }
    let strip = |s: &str| s.replace([':', '-'], "").to_ascii_lowercase();
    strip(address) == strip(identifier)
}
