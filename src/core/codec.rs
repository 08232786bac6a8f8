//! # Codec Contract and Stream Framing
//!
//! [`WireCodec`] is the capability every encoding implements: payload to
//! bytes and back, plus the fixed 4-byte big-endian length prefix used by
//! the stream framing. [`FrameCodec`] plugs a `WireCodec` into
//! `tokio_util::codec` so a `Framed` stream can reassemble frames split
//! across arbitrary reads.
//!
//! ## Wire Format
//! ```text
//! [Length(4, big-endian)] [Body(Length)]
//! ```

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::config::{FramingConfig, MAX_FRAME_LEN};
use crate::core::serialization::{Payload, WireFormat};
use crate::error::{Result, WireError};

/// Width of the length prefix. A protocol invariant, not a setting.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Per-instance codec diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecOptions {
    /// Log every payload after it has been encoded
    pub logging: bool,
    /// Pretty-print logged text payloads
    pub pretty: bool,
}

/// Serialization contract shared by every wire encoding.
///
/// Implementations must be deterministic, must never leave a partially
/// written body in the destination buffer and must report undecodable input
/// as [`WireError::MalformedPayload`] (or [`WireError::UnexpectedType`]).
pub trait WireCodec: Send + Sync {
    fn format(&self) -> WireFormat;

    fn options(&self) -> CodecOptions;

    /// Append the encoded body of `payload` to `dst`.
    ///
    /// On error `dst` is left exactly as it was.
    fn encode_into<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()>;

    /// Decode a body produced by [`WireCodec::encode`].
    fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T>;

    /// Read the type tag of an encoded body without decoding it.
    fn type_tag<'a>(&self, bytes: &'a [u8]) -> Result<&'a str>;

    fn encode<T: Payload>(&self, payload: &T) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(payload, &mut buf)?;
        Ok(buf.freeze())
    }

    #[inline]
    fn write_length(&self, length: u32) -> [u8; LENGTH_PREFIX_LEN] {
        length.to_be_bytes()
    }

    #[inline]
    fn read_length(&self, prefix: [u8; LENGTH_PREFIX_LEN]) -> u32 {
        u32::from_be_bytes(prefix)
    }

    #[inline]
    fn frame_overhead_bytes(&self) -> usize {
        LENGTH_PREFIX_LEN
    }
}

impl<C: WireCodec> WireCodec for Arc<C> {
    fn format(&self) -> WireFormat {
        (**self).format()
    }

    fn options(&self) -> CodecOptions {
        (**self).options()
    }

    fn encode_into<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()> {
        (**self).encode_into(payload, dst)
    }

    fn decode<T: Payload>(&self, bytes: &[u8]) -> Result<T> {
        (**self).decode(bytes)
    }

    fn type_tag<'a>(&self, bytes: &'a [u8]) -> Result<&'a str> {
        (**self).type_tag(bytes)
    }
}

/// Length-prefixed stream framing on top of a [`WireCodec`].
///
/// Decoding yields frame bodies as `Bytes`, split out of the read buffer
/// without copying.
#[derive(Debug, Clone)]
pub struct FrameCodec<C> {
    codec: C,
    max_frame_len: usize,
}

impl<C: WireCodec> FrameCodec<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    pub fn from_config(codec: C, config: &FramingConfig) -> Self {
        Self::new(codec).with_max_frame_len(config.max_frame_len)
    }

    /// Cap the accepted body length. Values above `u32::MAX` are clamped.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.min(u32::MAX as usize);
        self
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Write `[length][body]` for `payload` into `dst` in one step.
    ///
    /// Either the whole frame is appended or `dst` is left untouched.
    pub fn encode_payload<T: Payload>(&self, payload: &T, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        dst.put_slice(&[0u8; LENGTH_PREFIX_LEN]);

        if let Err(e) = self.codec.encode_into(payload, dst) {
            dst.truncate(start);
            return Err(e);
        }

        let body_len = dst.len() - start - LENGTH_PREFIX_LEN;
        if body_len > self.max_frame_len {
            dst.truncate(start);
            return Err(WireError::OversizedFrame(body_len));
        }

        let prefix = self.codec.write_length(body_len as u32);
        dst[start..start + LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
        trace!(tag = T::TYPE_TAG, body_len, "Framed payload");
        Ok(())
    }

    pub fn decode_payload<T: Payload>(&self, body: &[u8]) -> Result<T> {
        self.codec.decode(body)
    }
}

impl<C: WireCodec> Decoder for FrameCodec<C> {
    type Item = Bytes;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let body_len = self.codec.read_length(prefix) as usize;

        if body_len > self.max_frame_len {
            warn!(body_len, max = self.max_frame_len, "Rejecting oversized frame");
            return Err(WireError::OversizedFrame(body_len));
        }

        let frame_len = LENGTH_PREFIX_LEN + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        Ok(Some(src.split_to(body_len).freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(buf)? {
            Some(body) => Ok(Some(body)),
            None if buf.is_empty() => Ok(None),
            None => Err(WireError::ConnectionClosed),
        }
    }
}

impl<C: WireCodec> Encoder<Bytes> for FrameCodec<C> {
    type Error = WireError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        if body.len() > self.max_frame_len {
            return Err(WireError::OversizedFrame(body.len()));
        }
        dst.reserve(LENGTH_PREFIX_LEN + body.len());
        dst.put_slice(&self.codec.write_length(body.len() as u32));
        dst.put_slice(&body);
        Ok(())
    }
}
