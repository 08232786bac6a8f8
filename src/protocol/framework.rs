//! Control messages exchanged by the toolkit itself.
//!
//! They share one reserved type tag so a reader can separate them from
//! application payloads with [`is_framework_tag`] before decoding anything.

use std::sync::OnceLock;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::codec::WireCodec;
use crate::core::serialization::Payload;
use crate::error::Result;

/// Type tag carried by every framework message.
pub const FRAMEWORK_TAG: &str = "~fw";

/// Prefix reserved for toolkit-owned type tags.
pub const RESERVED_TAG_PREFIX: char = '~';

#[inline]
pub fn is_framework_tag(tag: &str) -> bool {
    tag == FRAMEWORK_TAG
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameworkMessage {
    /// Server-assigned connection ID handed to the client over TCP.
    RegisterTcp { connection_id: i32 },
    /// Client's UDP registration, correlating its datagrams with the TCP link.
    RegisterUdp { connection_id: i32 },
    KeepAlive,
    /// Host discovery request, broadcast by clients.
    DiscoverHost,
    /// Round-trip probe. The peer answers with the same `id` and `is_reply` set.
    Ping { id: i32, is_reply: bool },
}

impl Payload for FrameworkMessage {
    const TYPE_TAG: &'static str = FRAMEWORK_TAG;
}

impl FrameworkMessage {
    pub fn ping(id: i32) -> Self {
        FrameworkMessage::Ping { id, is_reply: false }
    }

    /// Turn a ping request into its reply. Other messages are returned as is.
    pub fn into_reply(self) -> Self {
        match self {
            FrameworkMessage::Ping { id, .. } => FrameworkMessage::Ping { id, is_reply: true },
            other => other,
        }
    }

    /// Static name for logs and routing.
    #[inline]
    pub fn opcode(&self) -> &'static str {
        match self {
            FrameworkMessage::RegisterTcp { .. } => "REGISTER_TCP",
            FrameworkMessage::RegisterUdp { .. } => "REGISTER_UDP",
            FrameworkMessage::KeepAlive => "KEEP_ALIVE",
            FrameworkMessage::DiscoverHost => "DISCOVER_HOST",
            FrameworkMessage::Ping { .. } => "PING",
        }
    }
}

/// Encode a keep-alive with `codec`.
pub fn encoded_keep_alive<C: WireCodec>(codec: &C) -> Result<Bytes> {
    codec.encode(&FrameworkMessage::KeepAlive)
}

/// Encoded keep-alive computed once per codec instance.
///
/// Cloning the returned `Bytes` only bumps a reference count, so sending a
/// keep-alive allocates nothing after the first call.
#[derive(Debug, Default)]
pub struct KeepAliveCache {
    encoded: OnceLock<Bytes>,
}

impl KeepAliveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<C: WireCodec>(&self, codec: &C) -> Result<Bytes> {
        if let Some(bytes) = self.encoded.get() {
            return Ok(bytes.clone());
        }
        let bytes = encoded_keep_alive(codec)?;
        Ok(self.encoded.get_or_init(|| bytes).clone())
    }
}
