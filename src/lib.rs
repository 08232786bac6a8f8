//! # netwire
//!
//! The wire layer of a client/server networking toolkit: pluggable payload
//! codecs, length-prefixed stream framing and UDP broadcast host discovery.
//!
//! ## Modules
//! - [`core`]: the [`WireCodec`] contract, JSON and binary encodings, framing
//! - [`protocol`]: framework control messages
//! - [`discovery`]: LAN host discovery requester and responder
//! - [`transport`]: typed payload exchange over a reliable stream
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Quick Start
//! ```rust,no_run
//! use netwire::config::DiscoveryConfig;
//! use netwire::core::serialization::JsonCodec;
//! use netwire::discovery::{DefaultClientDiscoveryHandler, DiscoveryRequester};
//!
//! # async fn run() -> netwire::error::Result<()> {
//! let config = DiscoveryConfig::default();
//! let requester = DiscoveryRequester::new(JsonCodec::default(), config.clone());
//! let mut handler = DefaultClientDiscoveryHandler;
//! match requester.discover_host(config.port, config.timeout, &mut handler).await? {
//!     Some(host) => println!("server at {}", host.endpoint),
//!     None => println!("no server answered"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::{DiscoveryConfig, DiscoveryMode, NetworkConfig};
pub use crate::core::codec::{CodecOptions, FrameCodec, WireCodec};
pub use crate::core::frame::Frame;
pub use crate::core::serialization::{AnyCodec, BinaryCodec, JsonCodec, Payload, WireFormat};
pub use crate::discovery::{DiscoveredHost, DiscoveryRequester, DiscoveryResponder, Endpoint};
pub use crate::error::{Result, WireError};
pub use crate::protocol::framework::FrameworkMessage;
pub use crate::transport::framed::{PayloadStream, Received};
