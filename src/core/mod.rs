//! # Core Wire Components
//!
//! Payload serialization and length-prefixed framing.
//!
//! ## Components
//! - **Codec**: the [`WireCodec`](codec::WireCodec) contract and the Tokio
//!   [`FrameCodec`](codec::FrameCodec) used over reliable streams
//! - **Serialization**: tagged JSON and binary encodings
//! - **Frame**: a single `[length][body]` frame
//!
//! ## Wire Format
//! ```text
//! [Length(4, big-endian)] [Body(Length)]
//! ```
//!
//! ## Limits
//! - Maximum body length: 16MB by default (checked before allocation)
//! - The length prefix is always 4 bytes

pub mod codec;
mod finite;
pub mod frame;
pub mod serialization;
