//! Platform-agnostic value codec and data model for blediag.
//!
//! This crate holds everything that does not need a Bluetooth adapter:
//! value formats, the byte/text codec, UUID normalization, the auto-format
//! rule table, ADC frame decoding, and the [`Sample`] record produced by
//! reads, notifications, and polling.
//!
//! # Example
//!
//! ```
//! use blediag_types::{CharacteristicRef, Format, codec};
//!
//! let target = CharacteristicRef::parse("0xffe0", "0xffe1").unwrap();
//! let bytes = codec::encode("0x2a", Format::Uint8).unwrap();
//! assert_eq!(codec::decode(&bytes, Format::Auto, Some(&target)).text(), "42");
//! ```

pub mod adc;
pub mod auto;
pub mod codec;
pub mod error;
pub mod format;
pub mod types;
pub mod uuid;

pub use adc::{AdcDecoder, ChannelReading, try_decode_adc};
pub use auto::{AutoAction, AutoFormatTable, AutoRule};
pub use codec::{DegradeReason, Decoded};
pub use error::{CodecError, CodecResult, ParseError, ParseResult};
pub use format::{Endian, Format};
pub use types::{CharacteristicRef, Sample};
pub use uuid as uuids;
