//! Bidirectional conversion between characteristic bytes and display text.
//!
//! Decoding never fails. When a buffer is too short for the requested numeric
//! format the result is a [`Decoded::Degraded`] carrying the hex rendering of
//! the buffer, so callers can still show something and log the reason.
//!
//! Encoding is strict: text that cannot be represented in the requested
//! format yields a [`CodecError`], and nothing is written.
//!
//! ```
//! use blediag_types::{Format, codec};
//!
//! let bytes = codec::encode("-2", Format::Int16Le).unwrap();
//! assert_eq!(&bytes[..], &[0xFE, 0xFF]);
//! assert_eq!(codec::decode(&bytes, Format::Int16Le, None).text(), "-2");
//! ```

use core::fmt;
use core::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

use crate::auto::AutoFormatTable;
use crate::error::{CodecError, CodecResult};
use crate::format::{Endian, Format};
use crate::types::CharacteristicRef;

/// Why a decode fell back to hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// The buffer held fewer bytes than one slot of the format.
    InsufficientBytes {
        format: Format,
        needed: usize,
        available: usize,
    },
}

impl DegradeReason {
    pub(crate) fn insufficient(format: Format, needed: usize, available: usize) -> Self {
        Self::InsufficientBytes {
            format,
            needed,
            available,
        }
    }
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::InsufficientBytes {
                format,
                needed,
                available,
            } => write!(
                f,
                "{} needs {} byte(s), got {}",
                format, needed, available
            ),
        }
    }
}

/// Result of decoding a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Text in the requested format.
    Value(String),
    /// Hex fallback with the reason the requested format was not used.
    Degraded { text: String, reason: DegradeReason },
}

impl Decoded {
    pub(crate) fn degraded(bytes: &[u8], reason: DegradeReason) -> Self {
        Decoded::Degraded {
            text: to_hex(bytes),
            reason,
        }
    }

    /// The display text, whichever variant this is.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Decoded::Value(text) | Decoded::Degraded { text, .. } => text,
        }
    }

    /// Consume and return the display text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Decoded::Value(text) | Decoded::Degraded { text, .. } => text,
        }
    }

    /// Whether the decode fell back to hex.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Decoded::Degraded { .. })
    }

    /// The degrade reason, if any.
    #[must_use]
    pub fn degrade_reason(&self) -> Option<&DegradeReason> {
        match self {
            Decoded::Value(_) => None,
            Decoded::Degraded { reason, .. } => Some(reason),
        }
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Lowercase two-digit hex per byte, space-separated.
///
/// ```
/// assert_eq!(blediag_types::codec::to_hex(&[0x01, 0xAB]), "01 ab");
/// assert_eq!(blediag_types::codec::to_hex(&[]), "");
/// ```
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    join_bytes(bytes, |out, byte| write!(out, "{:02x}", byte))
}

/// Eight binary digits per byte, space-separated.
#[must_use]
pub fn to_bits(bytes: &[u8]) -> String {
    join_bytes(bytes, |out, byte| write!(out, "{:08b}", byte))
}

fn join_bytes(bytes: &[u8], mut render: impl FnMut(&mut String, u8) -> fmt::Result) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        // Writing into a String cannot fail.
        let _ = render(&mut out, *byte);
    }
    out
}

/// Decode a buffer as a single value.
///
/// Numeric formats read the first slot only; trailing bytes are ignored.
/// `Auto` uses the standard [`AutoFormatTable`] and the characteristic from
/// `hint`.
#[must_use]
pub fn decode(bytes: &[u8], format: Format, hint: Option<&CharacteristicRef>) -> Decoded {
    decode_with_table(bytes, format, hint, AutoFormatTable::standard_ref())
}

/// Like [`decode`], resolving `Auto` through a caller-supplied table.
#[must_use]
pub fn decode_with_table(
    bytes: &[u8],
    format: Format,
    hint: Option<&CharacteristicRef>,
    table: &AutoFormatTable,
) -> Decoded {
    match format {
        Format::Auto => table.decode(bytes, hint.map(|target| &target.characteristic)),
        f => match f.width() {
            Some(width) => match bytes.get(..width) {
                Some(slot) => Decoded::Value(decode_slot(slot, f)),
                None => Decoded::degraded(
                    bytes,
                    DegradeReason::insufficient(f, width, bytes.len()),
                ),
            },
            None => Decoded::Value(decode_text(bytes, f)),
        },
    }
}

/// Decode every complete slot of a numeric format, space-separated.
///
/// Trailing bytes that do not fill a slot are ignored. A buffer with no
/// complete slot degrades to hex. Non-numeric formats behave like [`decode`].
///
/// ```
/// use blediag_types::{Format, codec};
///
/// let decoded = codec::decode_all(&[0x01, 0x00, 0x02, 0x00, 0x03], Format::Uint16Le, None);
/// assert_eq!(decoded.text(), "1 2");
/// ```
#[must_use]
pub fn decode_all(bytes: &[u8], format: Format, hint: Option<&CharacteristicRef>) -> Decoded {
    decode_all_with_table(bytes, format, hint, AutoFormatTable::standard_ref())
}

/// Like [`decode_all`], resolving `Auto` through a caller-supplied table.
#[must_use]
pub fn decode_all_with_table(
    bytes: &[u8],
    format: Format,
    hint: Option<&CharacteristicRef>,
    table: &AutoFormatTable,
) -> Decoded {
    let Some(width) = format.width() else {
        return decode_with_table(bytes, format, hint, table);
    };

    if bytes.len() < width {
        return Decoded::degraded(bytes, DegradeReason::insufficient(format, width, bytes.len()));
    }

    let values: Vec<String> = bytes
        .chunks_exact(width)
        .map(|slot| decode_slot(slot, format))
        .collect();
    Decoded::Value(values.join(" "))
}

fn decode_text(bytes: &[u8], format: Format) -> String {
    match format {
        Format::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Format::Base64 => BASE64.encode(bytes),
        Format::Bits => to_bits(bytes),
        _ => to_hex(bytes),
    }
}

/// Render one numeric slot. `slot.len()` equals `format.width()`.
fn decode_slot(slot: &[u8], format: Format) -> String {
    let big = format.endian() == Some(Endian::Big);
    match format {
        Format::Uint8 => slot[0].to_string(),
        Format::Int8 => (slot[0] as i8).to_string(),
        Format::Uint16Le | Format::Uint16Be => read_u16(slot, big).to_string(),
        Format::Int16Le | Format::Int16Be => (read_u16(slot, big) as i16).to_string(),
        Format::Uint32Le | Format::Uint32Be => read_u32(slot, big).to_string(),
        Format::Int32Le | Format::Int32Be => (read_u32(slot, big) as i32).to_string(),
        Format::Float32Le | Format::Float32Be => format_f32(f32::from_bits(read_u32(slot, big))),
        _ => to_hex(slot),
    }
}

fn read_u16(slot: &[u8], big: bool) -> u16 {
    let raw = [slot[0], slot[1]];
    if big {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    }
}

fn read_u32(slot: &[u8], big: bool) -> u32 {
    let raw = [slot[0], slot[1], slot[2], slot[3]];
    if big {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        value.to_string()
    }
}

/// Encode user text into bytes.
///
/// - `Hex`: space- or comma-separated byte pairs, each optionally `0x`
///   prefixed. Text that does not match that pattern is sent as UTF-8.
/// - `UTF8`: the text's UTF-8 bytes.
/// - `Base64`: standard alphabet; whitespace is ignored.
/// - `Bits`: groups of exactly eight `0`/`1` digits.
/// - Numeric formats: a single decimal or `0x` hex number. Integers are
///   truncated toward zero and wrapped to the slot width.
///
/// # Errors
///
/// Returns [`CodecError::InvalidInput`] when the text is not valid for the
/// format, and [`CodecError::DecodeOnly`] for [`Format::Auto`].
pub fn encode(text: &str, format: Format) -> CodecResult<Bytes> {
    match format {
        Format::Hex => Ok(match parse_hex_pattern(text) {
            Some(bytes) => Bytes::from(bytes),
            None => Bytes::copy_from_slice(text.as_bytes()),
        }),
        Format::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
        Format::Base64 => encode_base64(text),
        Format::Bits => encode_bits(text),
        Format::Auto => Err(CodecError::DecodeOnly(Format::Auto)),
        numeric => encode_number(text, numeric),
    }
}

/// Parse `"01 0x02,ff"` style text. Returns `None` when the text is not
/// entirely made of byte pairs.
fn parse_hex_pattern(text: &str) -> Option<Vec<u8>> {
    let normalized = text.replace(',', " ");
    let mut rest = normalized.trim_start();
    if rest.is_empty() {
        return None;
    }

    let mut bytes = Vec::new();
    while !rest.is_empty() {
        rest = rest
            .strip_prefix("0x")
            .or_else(|| rest.strip_prefix("0X"))
            .unwrap_or(rest);
        let pair = rest.get(..2)?;
        bytes.extend(hex::decode(pair).ok()?);
        rest = rest[2..].trim_start();
    }
    Some(bytes)
}

fn encode_base64(text: &str) -> CodecResult<Bytes> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map(Bytes::from)
        .map_err(|e| CodecError::invalid_input(Format::Base64, e.to_string()))
}

fn encode_bits(text: &str) -> CodecResult<Bytes> {
    let mut bytes = Vec::new();
    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
    {
        if token.len() != 8 || !token.chars().all(|c| c == '0' || c == '1') {
            return Err(CodecError::invalid_input(
                Format::Bits,
                format!("token '{}' is not 8 binary digits", token),
            ));
        }
        let byte = u8::from_str_radix(token, 2)
            .map_err(|e| CodecError::invalid_input(Format::Bits, e.to_string()))?;
        bytes.push(byte);
    }

    if bytes.is_empty() {
        return Err(CodecError::invalid_input(Format::Bits, "no bit groups"));
    }
    Ok(Bytes::from(bytes))
}

fn parse_number(text: &str, format: Format) -> CodecResult<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CodecError::invalid_input(format, "empty value"));
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let value = if let Some(digits) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        let magnitude = u64::from_str_radix(digits, 16)
            .map_err(|_| CodecError::invalid_input(format, format!("'{}' is not a number", text)))?;
        let magnitude = magnitude as f64;
        if negative { -magnitude } else { magnitude }
    } else {
        trimmed
            .parse::<f64>()
            .map_err(|_| CodecError::invalid_input(format, format!("'{}' is not a number", text)))?
    };

    if !value.is_finite() {
        return Err(CodecError::invalid_input(format, "value is not finite"));
    }
    Ok(value)
}

/// Decimal text is parsed straight to `f32` so the shortest rendering of a
/// float always encodes back to the same bits.
fn parse_f32(text: &str, parsed: f64, format: Format) -> CodecResult<f32> {
    let value = text.trim().parse::<f32>().unwrap_or(parsed as f32);
    if !value.is_finite() {
        return Err(CodecError::invalid_input(format, "value out of Float32 range"));
    }
    Ok(value)
}

/// Truncate toward zero, then reduce modulo `2^bits`.
///
/// The reduction happens in `f64`, where it is exact, so magnitudes past
/// `i64` still wrap instead of saturating.
fn wrap_to_width(value: f64, bits: i32) -> u64 {
    value.trunc().rem_euclid(2f64.powi(bits)) as u64
}

fn encode_number(text: &str, format: Format) -> CodecResult<Bytes> {
    let value = parse_number(text, format)?;
    let big = format.endian() == Some(Endian::Big);

    let bytes: Vec<u8> = match format {
        Format::Uint8 | Format::Int8 => vec![wrap_to_width(value, 8) as u8],
        Format::Uint16Le | Format::Uint16Be | Format::Int16Le | Format::Int16Be => {
            let raw = wrap_to_width(value, 16) as u16;
            (if big { raw.to_be_bytes() } else { raw.to_le_bytes() }).to_vec()
        }
        Format::Uint32Le | Format::Uint32Be | Format::Int32Le | Format::Int32Be => {
            let raw = wrap_to_width(value, 32) as u32;
            (if big { raw.to_be_bytes() } else { raw.to_le_bytes() }).to_vec()
        }
        Format::Float32Le | Format::Float32Be => {
            let raw = parse_f32(text, value, format)?;
            (if big { raw.to_be_bytes() } else { raw.to_le_bytes() }).to_vec()
        }
        other => {
            return Err(CodecError::invalid_input(other, "not a numeric format"));
        }
    };
    Ok(Bytes::from(bytes))
}
