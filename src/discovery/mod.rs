//! # Host Discovery
//!
//! UDP broadcast discovery: a client broadcasts one `DiscoverHost` request
//! and servers on the LAN answer with a unicast datagram.
//!
//! ## Components
//! - **Requester**: broadcasts, collects replies and applies a
//!   [`ClientDiscoveryHandler`] policy
//! - **Responder**: listens for requests and answers through a
//!   [`ServerDiscoveryHandler`] policy
//! - **Socket**: the datagram seam both sides use, plus socket construction
//!
//! ## Wire Exchange
//! ```text
//! client --(broadcast: encoded DiscoverHost)--> server:port
//! client <--(unicast: reply body)-------------- server:port
//! ```
//! Neither datagram carries a length prefix. Not finding a server is
//! `Ok(None)`, never an error.

pub mod requester;
pub mod responder;
pub mod socket;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;

use crate::core::codec::WireCodec;
use crate::core::serialization::Payload;
use crate::error::Result;

pub use requester::{
    ClientDiscoveryHandler, DefaultClientDiscoveryHandler, DiscoveryRequester, ExpectPayload,
    Fastest,
};
pub use responder::{
    DefaultDiscoveryHandler, DiscoveryResponder, PayloadReply, RejectAll, ReplyWith,
    ResponderHandle, ServerDiscoveryHandler,
};
pub use socket::{DatagramSocket, ReplySocket};

/// Address and port a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.socket_addr()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}

/// One reply accepted by a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub endpoint: Endpoint,
    /// Raw reply body. Empty for servers using the default policy.
    pub payload: Bytes,
    /// Time between the broadcast and this reply.
    pub elapsed: Duration,
}

impl DiscoveredHost {
    /// Decode the reply body as `T`.
    pub fn decode<T: Payload, C: WireCodec>(&self, codec: &C) -> Result<T> {
        codec.decode(&self.payload)
    }

    /// Whether the server sent the empty default reply.
    pub fn is_bare(&self) -> bool {
        self.payload.is_empty()
    }
}
