//! # Wire Encodings
//!
//! Concrete [`WireCodec`] implementations and the [`Payload`] contract they
//! serialize.
//!
//! Every encoded body starts with the payload's type tag so that a reader can
//! tell which type it carries before decoding it:
//!
//! ```text
//! JSON:    <tag> ':' <compact JSON document>          (UTF-8 text)
//! Binary:  [tag_len(1)] [tag(tag_len)] [bincode body]
//! ```
//!
//! ## Formats
//! - **JSON**: human-readable, handy for debugging and interop (default)
//! - **Binary**: compact bincode body behind a one-byte tag length
//!
//! Both are deterministic for a given value as long as the payload type
//! serializes its fields in a fixed order (structs do; `HashMap` does not).
//!
//! ## Usage
//! ```rust
//! use netwire::core::codec::{CodecOptions, WireCodec};
//! use netwire::core::serialization::{JsonCodec, Payload};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Hello {
//!     name: String,
//! }
//!
//! impl Payload for Hello {
//!     const TYPE_TAG: &'static str = "hello";
//! }
//!
//! let codec = JsonCodec::new(CodecOptions::default());
//! let bytes = codec.encode(&Hello { name: "lan".into() }).unwrap();
//! assert_eq!(&bytes[..], br#"hello:{"name":"lan"}"#);
//! let back: Hello = codec.decode(&bytes).unwrap();
//! assert_eq!(back.name, "lan");
//! ```

use bincode::Options;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{CodecConfig, MAX_FRAME_LEN};
use crate::core::codec::{CodecOptions, WireCodec};
use crate::core::finite::check_finite;
use crate::error::constants::*;
use crate::error::{Result, WireError};
use crate::protocol::framework::{is_framework_tag, RESERVED_TAG_PREFIX};

/// Separator between the type tag and the JSON document.
const JSON_TAG_SEPARATOR: u8 = b':';

/// Longest tag the binary encoding can carry in its one-byte length.
pub const MAX_TAG_LEN: usize = u8::MAX as usize;

/// A value that can travel through a [`WireCodec`].
///
/// `TYPE_TAG` identifies the type on the wire. Tags must be non-empty, at most
/// [`MAX_TAG_LEN`] bytes and free of `':'`. Tags starting with `~` are
/// reserved for framework messages and refused when encoding anything else.
pub trait Payload: Serialize + DeserializeOwned {
    const TYPE_TAG: &'static str;
}

/// Supported wire encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Compact tagged binary (bincode body)
    Binary,
    /// Tagged UTF-8 JSON text
    #[default]
    Json,
}

impl WireFormat {
    /// Identifier byte for diagnostics and configuration
    pub fn format_byte(self) -> u8 {
        match self {
            WireFormat::Binary => 0x01,
            WireFormat::Json => 0x02,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(WireFormat::Binary),
            0x02 => Some(WireFormat::Json),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            WireFormat::Binary => "Binary",
            WireFormat::Json => "JSON",
        }
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(WireError::Encoding(ERR_EMPTY_TAG.to_string()));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(WireError::Encoding(ERR_TAG_TOO_LONG.to_string()));
    }
    if tag.as_bytes().contains(&JSON_TAG_SEPARATOR) {
        return Err(WireError::Encoding(ERR_TAG_HAS_SEPARATOR.to_string()));
    }
    if tag.starts_with(RESERVED_TAG_PREFIX) && !is_framework_tag(tag) {
        return Err(WireError::Encoding(ERR_TAG_RESERVED.to_string()));
    }
    Ok(())
}

fn expect_tag<T: Payload>(found: &str) -> Result<()> {
    if found == T::TYPE_TAG {
        Ok(())
    } else {
        Err(WireError::UnexpectedType {
            expected: T::TYPE_TAG,
            found: found.to_string(),
        })
    }
}

/// Tagged JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    options: CodecOptions,
}

impl JsonCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    fn split<'a>(&self, bytes: &'a [u8]) -> Result<(&'a str, &'a [u8])> {
        if bytes.is_empty() {
            return Err(WireError::MalformedPayload(ERR_EMPTY_PAYLOAD.to_string()));
        }
        let idx = bytes
            .iter()
            .position(|b| *b == JSON_TAG_SEPARATOR)
            .ok_or_else(|| WireError::MalformedPayload(ERR_MISSING_TAG_SEPARATOR.to_string()))?;
        let tag = std::str::from_utf8(&bytes[..idx])
            .map_err(|_| WireError::MalformedPayload(ERR_TAG_NOT_UTF8.to_string()))?;
        Ok((tag, &bytes[idx + 1..]))
    }

    // Runs after the bytes are final; only reads what was written.
    fn log_written(&self, tag: &str, written: &[u8]) {
        let document = match std::str::from_utf8(written) {
            Ok(text) => text.split_once(':').map(|(_, doc)| doc).unwrap_or(text),
            Err(_) => return,
        };
        let rendered = if self.options.pretty {
            serde_json::from_str::<serde_json::Value>(document)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| document.to_string())
        } else {
            document.to_string()
        };
        if is_framework_tag(tag) {
            trace!(tag, bytes = written.len(), "Wrote: {rendered}");
        } else {
            debug!(tag, bytes = written.len(), "Wrote: {rendered}");
        }
    }
}

impl WireCodec for JsonCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Json
    }

    fn options(&self) -> CodecOptions {
        self.options
    }

    fn encode_into<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()> {
        validate_tag(T::TYPE_TAG)?;
        check_finite(payload).map_err(|e| WireError::Encoding(e.to_string()))?;

        let start = dst.len();
        dst.put_slice(T::TYPE_TAG.as_bytes());
        dst.put_u8(JSON_TAG_SEPARATOR);

        if let Err(e) = serde_json::to_writer((&mut *dst).writer(), payload) {
            dst.truncate(start);
            return Err(WireError::Encoding(e.to_string()));
        }

        if self.options.logging {
            self.log_written(T::TYPE_TAG, &dst[start..]);
        }
        Ok(())
    }

    fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T> {
        let (tag, document) = self.split(bytes)?;
        expect_tag::<T>(tag)?;
        serde_json::from_slice(document).map_err(|e| WireError::MalformedPayload(e.to_string()))
    }

    fn type_tag<'a>(&self, bytes: &'a [u8]) -> Result<&'a str> {
        self.split(bytes).map(|(tag, _)| tag)
    }
}

/// Tagged binary encoding with a bincode body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec {
    options: CodecOptions,
}

impl BinaryCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    fn bincode_options() -> impl Options {
        bincode::DefaultOptions::new().with_fixint_encoding()
    }

    fn split<'a>(&self, bytes: &'a [u8]) -> Result<(&'a str, &'a [u8])> {
        let (&tag_len, rest) = bytes
            .split_first()
            .ok_or_else(|| WireError::MalformedPayload(ERR_EMPTY_PAYLOAD.to_string()))?;
        let tag_len = tag_len as usize;
        if tag_len == 0 || rest.len() < tag_len {
            return Err(WireError::MalformedPayload(ERR_TRUNCATED_TAG.to_string()));
        }
        let tag = std::str::from_utf8(&rest[..tag_len])
            .map_err(|_| WireError::MalformedPayload(ERR_TAG_NOT_UTF8.to_string()))?;
        Ok((tag, &rest[tag_len..]))
    }
}

impl WireCodec for BinaryCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Binary
    }

    fn options(&self) -> CodecOptions {
        self.options
    }

    fn encode_into<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()> {
        validate_tag(T::TYPE_TAG)?;

        let start = dst.len();
        dst.put_u8(T::TYPE_TAG.len() as u8);
        dst.put_slice(T::TYPE_TAG.as_bytes());

        if let Err(e) = Self::bincode_options().serialize_into((&mut *dst).writer(), payload) {
            dst.truncate(start);
            return Err(WireError::Encoding(e.to_string()));
        }

        if self.options.logging {
            let written = dst.len() - start;
            if is_framework_tag(T::TYPE_TAG) {
                trace!(tag = T::TYPE_TAG, bytes = written, "Wrote binary payload");
            } else {
                debug!(tag = T::TYPE_TAG, bytes = written, "Wrote binary payload");
            }
        }
        Ok(())
    }

    fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T> {
        let (tag, body) = self.split(bytes)?;
        expect_tag::<T>(tag)?;
        Self::bincode_options()
            .with_limit(MAX_FRAME_LEN as u64)
            .deserialize(body)
            .map_err(|e| WireError::MalformedPayload(e.to_string()))
    }

    fn type_tag<'a>(&self, bytes: &'a [u8]) -> Result<&'a str> {
        self.split(bytes).map(|(tag, _)| tag)
    }
}

/// Runtime-selected codec, for when the encoding comes from configuration.
#[derive(Debug, Clone, Copy)]
pub enum AnyCodec {
    Json(JsonCodec),
    Binary(BinaryCodec),
}

impl AnyCodec {
    pub fn new(format: WireFormat, options: CodecOptions) -> Self {
        match format {
            WireFormat::Json => AnyCodec::Json(JsonCodec::new(options)),
            WireFormat::Binary => AnyCodec::Binary(BinaryCodec::new(options)),
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(
            config.format,
            CodecOptions {
                logging: config.logging,
                pretty: config.pretty,
            },
        )
    }
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::new(WireFormat::default(), CodecOptions::default())
    }
}

impl WireCodec for AnyCodec {
    fn format(&self) -> WireFormat {
        match self {
            AnyCodec::Json(c) => c.format(),
            AnyCodec::Binary(c) => c.format(),
        }
    }

    fn options(&self) -> CodecOptions {
        match self {
            AnyCodec::Json(c) => c.options(),
            AnyCodec::Binary(c) => c.options(),
        }
    }

    fn encode_into<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()> {
        match self {
            AnyCodec::Json(c) => c.encode_into(payload, dst),
            AnyCodec::Binary(c) => c.encode_into(payload, dst),
        }
    }

    fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            AnyCodec::Json(c) => c.decode(bytes),
            AnyCodec::Binary(c) => c.decode(bytes),
        }
    }

    fn type_tag<'a>(&self, bytes: &'a [u8]) -> Result<&'a str> {
        match self {
            AnyCodec::Json(c) => c.type_tag(bytes),
            AnyCodec::Binary(c) => c.type_tag(bytes),
        }
    }
}
