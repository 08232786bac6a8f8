//! # Error Types
//!
//! Error handling for the wire layer.
//!
//! ## Error Categories
//! - **Encoding**: a payload could not be turned into bytes; nothing was written
//! - **Malformed payloads**: bytes that do not decode to the requested payload
//! - **Framing**: oversized or truncated length-prefixed frames
//! - **Socket**: bind/send/receive failures on the discovery sockets
//! - **Configuration**: invalid or unreadable configuration
//!
//! "No server found" is not an error: discovery reports it as `Ok(None)`.
//!
//! ## Example Usage
//! ```rust
//! use netwire::error::{Result, WireError};
//!
//! fn check_body(body: &[u8]) -> Result<()> {
//!     if body.is_empty() {
//!         return Err(WireError::MalformedPayload("empty body".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_body(b"").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    pub const ERR_EMPTY_PAYLOAD: &str = "payload is empty";
    pub const ERR_MISSING_TAG_SEPARATOR: &str = "missing type tag separator";
    pub const ERR_TRUNCATED_TAG: &str = "type tag truncated";
    pub const ERR_TAG_NOT_UTF8: &str = "type tag is not valid UTF-8";
    pub const ERR_EMPTY_TAG: &str = "type tag cannot be empty";
    pub const ERR_TAG_TOO_LONG: &str = "type tag exceeds 255 bytes";
    pub const ERR_TAG_HAS_SEPARATOR: &str = "type tag cannot contain ':'";
    pub const ERR_TAG_RESERVED: &str = "type tags starting with '~' are reserved";
    pub const ERR_NO_BROADCAST_SENT: &str = "discovery request could not be sent to any target";
}

/// Primary error type for codec, framing and discovery operations.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unexpected payload type: expected '{expected}', found '{found}'")]
    UnexpectedType { expected: &'static str, found: String },

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Socket error during {op}: {source}")]
    Socket {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WireError {
    /// Wrap an I/O error raised by a socket operation.
    pub fn socket(op: &'static str, source: io::Error) -> Self {
        WireError::Socket { op, source }
    }

    /// Whether the error concerns the content of a single payload rather than
    /// the channel it travelled on. Such errors are isolated per datagram.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            WireError::MalformedPayload(_) | WireError::UnexpectedType { .. }
        )
    }
}

/// Type alias for Results using WireError
pub type Result<T> = std::result::Result<T, WireError>;
