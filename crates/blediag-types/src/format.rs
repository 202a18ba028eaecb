//! Value formats understood by the codec.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Byte order of a multi-byte numeric slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// A textual or numeric representation of a characteristic value.
///
/// Every format except [`Format::Auto`] can be used in both directions.
/// `Auto` is decode-only: it is resolved per characteristic through an
/// [`AutoFormatTable`](crate::auto::AutoFormatTable).
///
/// Names parse case-insensitively, so `"uint16le"`, `"Uint16LE"` and
/// `"UINT16LE"` are the same format.
///
/// ```
/// use blediag_types::Format;
///
/// let format: Format = "int16be".parse().unwrap();
/// assert_eq!(format, Format::Int16Be);
/// assert_eq!(format.width(), Some(2));
/// assert_eq!(format.to_string(), "Int16BE");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Format {
    /// Lowercase two-digit hex bytes, space-separated.
    #[default]
    Hex,
    /// UTF-8 text.
    Utf8,
    /// Standard Base64.
    Base64,
    /// Eight binary digits per byte, space-separated.
    Bits,
    Uint8,
    Int8,
    Uint16Le,
    Uint16Be,
    Int16Le,
    Int16Be,
    Uint32Le,
    Uint32Be,
    Int32Le,
    Int32Be,
    Float32Le,
    Float32Be,
    /// Per-characteristic heuristic (decode-only).
    Auto,
}

impl Format {
    /// All formats, in the order a picker would list them.
    pub const ALL: [Format; 17] = [
        Format::Hex,
        Format::Utf8,
        Format::Base64,
        Format::Bits,
        Format::Uint8,
        Format::Int8,
        Format::Uint16Le,
        Format::Uint16Be,
        Format::Int16Le,
        Format::Int16Be,
        Format::Uint32Le,
        Format::Uint32Be,
        Format::Int32Le,
        Format::Int32Be,
        Format::Float32Le,
        Format::Float32Be,
        Format::Auto,
    ];

    /// Canonical display name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Format::Hex => "Hex",
            Format::Utf8 => "UTF8",
            Format::Base64 => "Base64",
            Format::Bits => "Bits",
            Format::Uint8 => "Uint8",
            Format::Int8 => "Int8",
            Format::Uint16Le => "Uint16LE",
            Format::Uint16Be => "Uint16BE",
            Format::Int16Le => "Int16LE",
            Format::Int16Be => "Int16BE",
            Format::Uint32Le => "Uint32LE",
            Format::Uint32Be => "Uint32BE",
            Format::Int32Le => "Int32LE",
            Format::Int32Be => "Int32BE",
            Format::Float32Le => "Float32LE",
            Format::Float32Be => "Float32BE",
            Format::Auto => "Auto",
        }
    }

    /// Byte width of one slot for fixed-width numeric formats.
    ///
    /// Returns `None` for the textual formats and `Auto`.
    #[must_use]
    pub fn width(&self) -> Option<usize> {
        match self {
            Format::Uint8 | Format::Int8 => Some(1),
            Format::Uint16Le | Format::Uint16Be | Format::Int16Le | Format::Int16Be => Some(2),
            Format::Uint32Le
            | Format::Uint32Be
            | Format::Int32Le
            | Format::Int32Be
            | Format::Float32Le
            | Format::Float32Be => Some(4),
            _ => None,
        }
    }

    /// Byte order of the numeric slot. Single-byte formats report `Little`.
    #[must_use]
    pub fn endian(&self) -> Option<Endian> {
        match self {
            Format::Uint16Be
            | Format::Int16Be
            | Format::Uint32Be
            | Format::Int32Be
            | Format::Float32Be => Some(Endian::Big),
            f if f.is_numeric() => Some(Endian::Little),
            _ => None,
        }
    }

    /// Whether this is a fixed-width numeric format.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.width().is_some()
    }

    /// Whether the numeric slot is signed (floats count as signed).
    #[must_use]
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Format::Int8
                | Format::Int16Le
                | Format::Int16Be
                | Format::Int32Le
                | Format::Int32Be
                | Format::Float32Le
                | Format::Float32Be
        )
    }

    /// Whether the numeric slot is an IEEE-754 float.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Format::Float32Le | Format::Float32Be)
    }

    /// Whether the format can be used to encode text into bytes.
    #[must_use]
    pub fn is_encodable(&self) -> bool {
        !matches!(self, Format::Auto)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        Format::ALL
            .into_iter()
            .find(|format| format.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ParseError::UnknownFormat(s.to_string()))
    }
}

impl TryFrom<String> for Format {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_round_trip() {
        for format in Format::ALL {
            let parsed: Format = format.name().parse().unwrap();
            assert_eq!(parsed, format);
        }
    }

    #[test]
    fn test_format_parse_is_case_insensitive() {
        assert_eq!("HEX".parse::<Format>().unwrap(), Format::Hex);
        assert_eq!("utf-8".parse::<Format>().unwrap(), Format::Utf8);
        assert_eq!("float32_be".parse::<Format>().unwrap(), Format::Float32Be);
        assert!("uint64le".parse::<Format>().is_err());
    }

    #[test]
    fn test_format_widths() {
        assert_eq!(Format::Hex.width(), None);
        assert_eq!(Format::Auto.width(), None);
        assert_eq!(Format::Int8.width(), Some(1));
        assert_eq!(Format::Uint16Be.width(), Some(2));
        assert_eq!(Format::Float32Le.width(), Some(4));
    }

    #[test]
    fn test_format_endianness() {
        assert_eq!(Format::Uint32Be.endian(), Some(Endian::Big));
        assert_eq!(Format::Int16Le.endian(), Some(Endian::Little));
        assert_eq!(Format::Uint8.endian(), Some(Endian::Little));
        assert_eq!(Format::Base64.endian(), None);
    }

    #[test]
    fn test_auto_is_decode_only() {
        assert!(!Format::Auto.is_encodable());
        assert!(Format::Bits.is_encodable());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_format_serde() {
        let json = serde_json::to_string(&Format::Uint16Le).unwrap();
        assert_eq!(json, "\"Uint16LE\"");
        let parsed: Format = serde_json::from_str("\"int32be\"").unwrap();
        assert_eq!(parsed, Format::Int32Be);
    }
}
