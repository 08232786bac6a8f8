//! # Protocol Vocabulary
//!
//! The fixed set of framework control messages that travel through a
//! [`WireCodec`](crate::core::codec::WireCodec) alongside application payloads.

pub mod framework;

pub use framework::{
    encoded_keep_alive, is_framework_tag, FrameworkMessage, KeepAliveCache, FRAMEWORK_TAG,
};
