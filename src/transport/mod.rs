//! # Transport Helpers
//!
//! Connection management lives in the embedding transport. This module only
//! provides the typed framing it drives over reliable streams.

pub mod framed;

pub use framed::{PayloadStream, Received};
