//! Error types for the value codec and identifier parsing in blediag-types.

use thiserror::Error;

use crate::format::Format;

/// Errors produced when turning user text into bytes.
///
/// Decoding never fails; see [`crate::codec::Decoded`] for how decode-side
/// problems are reported. Only the encode direction returns this type.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The text cannot be represented in the requested format.
    #[error("Invalid {format} input: {reason}")]
    InvalidInput {
        /// The format the text was being encoded as.
        format: Format,
        /// Why the text was rejected.
        reason: String,
    },

    /// The format can only be used for decoding.
    #[error("Format {0} is decode-only")]
    DecodeOnly(Format),
}

impl CodecError {
    /// Create an invalid input error.
    pub fn invalid_input(format: Format, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            format,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when parsing identifiers and format names.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The string is neither a canonical UUID nor a `0x` shorthand.
    #[error("Invalid UUID '{0}': expected a canonical UUID or a 0x-prefixed 16/32-bit shorthand")]
    InvalidUuid(String),

    /// The string does not name a known value format.
    #[error("Unknown format '{0}'")]
    UnknownFormat(String),

    /// The string does not name a known auto-format rule kind.
    #[error("Unknown auto-format rule '{0}'")]
    UnknownRule(String),
}

/// Result type alias using blediag-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type alias for encode operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::invalid_input(Format::Bits, "token '101' is not 8 binary digits");
        assert_eq!(
            err.to_string(),
            "Invalid Bits input: token '101' is not 8 binary digits"
        );

        let err = CodecError::DecodeOnly(Format::Auto);
        assert_eq!(err.to_string(), "Format Auto is decode-only");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidUuid("0xzz".to_string());
        assert!(err.to_string().contains("0xzz"));

        let err = ParseError::UnknownFormat("uint64".to_string());
        assert_eq!(err.to_string(), "Unknown format 'uint64'");
    }
}
