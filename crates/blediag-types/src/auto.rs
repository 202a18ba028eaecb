//! Per-characteristic auto-format rules.
//!
//! Some peripheral firmwares assign meaning to characteristics purely by
//! their UUID suffix and publish no format descriptor. [`Format::Auto`]
//! resolves the decode rule by matching the characteristic identifier
//! against an ordered table of markers; the first marker contained in the
//! identifier (case-insensitive) wins.
//!
//! The standard table encodes the convention of HM-10 style UART modules:
//!
//! | Marker | Decoded as |
//! |--------|------------|
//! | `ffe0` | byte 0 as a boolean (`0` / `1`) |
//! | `ffe1` | byte 0 as an unsigned integer |
//! | `ffe3` | hex of the whole buffer |
//! | (none) | hex of the whole buffer |
//!
//! Deployments with other conventions can build their own table, or load one
//! from configuration when the `serde` feature is enabled.

use core::fmt;
use core::str::FromStr;
use std::sync::LazyLock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{self, DegradeReason, Decoded};
use crate::error::ParseError;
use crate::format::Format;

/// What to do with a buffer whose characteristic matched a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum AutoAction {
    /// Byte 0 rendered as `1` when non-zero, `0` otherwise.
    Boolean,
    /// Byte 0 rendered as an unsigned integer.
    FirstByte,
    /// Whole buffer rendered as hex.
    Hex,
    /// Whole buffer decoded with an explicit format.
    Format(Format),
}

impl AutoAction {
    /// Apply the action to a buffer.
    ///
    /// Actions that read byte 0 degrade to hex on an empty buffer.
    #[must_use]
    pub fn apply(&self, bytes: &[u8]) -> Decoded {
        match self {
            AutoAction::Boolean => match bytes.first() {
                Some(byte) => Decoded::Value(if *byte != 0 { "1" } else { "0" }.to_string()),
                None => Decoded::degraded(bytes, DegradeReason::insufficient(Format::Auto, 1, 0)),
            },
            AutoAction::FirstByte => match bytes.first() {
                Some(byte) => Decoded::Value(byte.to_string()),
                None => Decoded::degraded(bytes, DegradeReason::insufficient(Format::Auto, 1, 0)),
            },
            AutoAction::Hex | AutoAction::Format(Format::Auto) => {
                Decoded::Value(codec::to_hex(bytes))
            }
            AutoAction::Format(format) => codec::decode_all(bytes, *format, None),
        }
    }
}

impl fmt::Display for AutoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoAction::Boolean => f.write_str("boolean"),
            AutoAction::FirstByte => f.write_str("byte"),
            AutoAction::Hex => f.write_str("hex"),
            AutoAction::Format(format) => write!(f, "{}", format),
        }
    }
}

impl FromStr for AutoAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(AutoAction::Boolean),
            "byte" | "first-byte" | "first_byte" => Ok(AutoAction::FirstByte),
            "hex" => Ok(AutoAction::Hex),
            _ => s
                .parse::<Format>()
                .map(AutoAction::Format)
                .map_err(|_| ParseError::UnknownRule(s.to_string())),
        }
    }
}

impl TryFrom<String> for AutoAction {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AutoAction> for String {
    fn from(action: AutoAction) -> Self {
        action.to_string()
    }
}

/// One marker → action mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutoRule {
    /// Substring looked for in the characteristic identifier.
    pub marker: String,
    /// How matching buffers are decoded.
    pub decode: AutoAction,
}

impl AutoRule {
    /// Create a rule. The marker is matched case-insensitively.
    pub fn new(marker: impl Into<String>, decode: AutoAction) -> Self {
        Self {
            marker: marker.into().to_ascii_lowercase(),
            decode,
        }
    }

    /// Whether the rule applies to a lowercase identifier string.
    fn matches(&self, identifier_lower: &str) -> bool {
        !self.marker.is_empty() && identifier_lower.contains(&self.marker.to_ascii_lowercase())
    }
}

/// Ordered marker table consulted by [`Format::Auto`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutoFormatTable {
    /// Rules in priority order.
    pub rules: Vec<AutoRule>,
    /// Action when no rule matches.
    #[cfg_attr(feature = "serde", serde(default = "default_fallback"))]
    pub fallback: AutoAction,
}

#[cfg(feature = "serde")]
fn default_fallback() -> AutoAction {
    AutoAction::Hex
}

static STANDARD_TABLE: LazyLock<AutoFormatTable> = LazyLock::new(AutoFormatTable::standard);

impl Default for AutoFormatTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl AutoFormatTable {
    /// An empty table: everything decodes with the fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            fallback: AutoAction::Hex,
        }
    }

    /// The HM-10 style convention (`ffe0`, `ffe1`, `ffe3`).
    #[must_use]
    pub fn standard() -> Self {
        Self {
            rules: vec![
                AutoRule::new("ffe0", AutoAction::Boolean),
                AutoRule::new("ffe1", AutoAction::FirstByte),
                AutoRule::new("ffe3", AutoAction::Hex),
            ],
            fallback: AutoAction::Hex,
        }
    }

    /// Shared instance of [`AutoFormatTable::standard`].
    pub fn standard_ref() -> &'static AutoFormatTable {
        &STANDARD_TABLE
    }

    /// Append a rule with lower priority than the existing ones.
    #[must_use]
    pub fn with_rule(mut self, marker: impl Into<String>, decode: AutoAction) -> Self {
        self.rules.push(AutoRule::new(marker, decode));
        self
    }

    /// Set the action used when no rule matches.
    #[must_use]
    pub fn with_fallback(mut self, fallback: AutoAction) -> Self {
        self.fallback = fallback;
        self
    }

    /// Find the action for a characteristic identifier.
    #[must_use]
    pub fn resolve_identifier(&self, identifier: &str) -> AutoAction {
        let lower = identifier.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lower))
            .map(|rule| rule.decode)
            .unwrap_or(self.fallback)
    }

    /// Find the action for a characteristic UUID.
    #[must_use]
    pub fn resolve(&self, characteristic: &Uuid) -> AutoAction {
        self.resolve_identifier(&crate::uuid::identifier_string(characteristic))
    }

    /// Decode a buffer for a characteristic, or with the fallback when the
    /// characteristic is unknown.
    #[must_use]
    pub fn decode(&self, bytes: &[u8], characteristic: Option<&Uuid>) -> Decoded {
        let action = characteristic
            .map(|uuid| self.resolve(uuid))
            .unwrap_or(self.fallback);
        action.apply(bytes)
    }
}
