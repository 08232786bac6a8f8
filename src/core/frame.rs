use bytes::Bytes;

use crate::config::MAX_FRAME_LEN;
use crate::core::codec::LENGTH_PREFIX_LEN;
use crate::error::{Result, WireError};

/// A single length-prefixed frame: `[length(4, BE)] [body]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub body: Bytes,
}

impl Frame {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Total size on the wire, prefix included.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_LEN + self.body.len()
    }

    /// Serialize prefix and body. Bodies over `MAX_FRAME_LEN` are rejected
    /// so the prefix always equals the body length.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.body.len() > MAX_FRAME_LEN {
            return Err(WireError::OversizedFrame(self.body.len()));
        }
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    /// Parse exactly one frame. The buffer must hold the prefix and exactly
    /// `length` body bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let body_len = Self::peek_len(buf).ok_or_else(|| {
            WireError::MalformedPayload("frame shorter than its length prefix".to_string())
        })?;

        if body_len > MAX_FRAME_LEN {
            return Err(WireError::OversizedFrame(body_len));
        }

        let body = &buf[LENGTH_PREFIX_LEN..];
        if body.len() != body_len {
            return Err(WireError::MalformedPayload(format!(
                "frame declares {body_len} body bytes but carries {}",
                body.len()
            )));
        }

        Ok(Self {
            body: Bytes::copy_from_slice(body),
        })
    }

    /// Body length announced by the prefix, if at least 4 bytes are present.
    pub fn peek_len(buf: &[u8]) -> Option<usize> {
        let prefix: [u8; LENGTH_PREFIX_LEN] = buf.get(..LENGTH_PREFIX_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(prefix) as usize)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_frame_empty_body() {
        let frame = Frame::default();
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert_eq!(Frame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new(vec![1u8, 2, 3]);
        assert_eq!(frame.encoded_len(), 7);
        assert_eq!(frame.to_bytes().unwrap(), vec![0, 0, 0, 3, 1, 2, 3]);
        assert_eq!(Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap(), frame);
    }

    #[test]
    fn test_frame_truncated_prefix() {
        assert!(Frame::from_bytes(&[0, 0, 1]).is_err());
        assert!(Frame::from_bytes(&[]).is_err());
        assert_eq!(Frame::peek_len(&[0, 0]), None);
    }

    #[test]
    fn test_frame_length_mismatch() {
        assert!(matches!(
            Frame::from_bytes(&[0, 0, 0, 4, 1, 2]),
            Err(WireError::MalformedPayload(_))
        ));
        assert!(matches!(
            Frame::from_bytes(&[0, 0, 0, 1, 1, 2]),
            Err(WireError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_frame_oversized_body_not_serialized() {
        let frame = Frame::new(vec![0u8; MAX_FRAME_LEN + 1]);
        assert!(matches!(
            frame.to_bytes(),
            Err(WireError::OversizedFrame(len)) if len == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn test_frame_oversized_claim() {
        let mut bytes = (20_000_000u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 10]);
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(WireError::OversizedFrame(20_000_000))
        ));
    }
}
