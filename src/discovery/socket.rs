//! Datagram socket seam and socket construction for discovery.
//!
//! [`ReplySocket`] is the narrow, object-safe surface a server policy gets
//! to answer a request. [`DatagramSocket`] adds the async operations the
//! requester's receive loop needs. Both are implemented for
//! `tokio::net::UdpSocket`.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::{Result, WireError};

/// Send side handed to server discovery policies.
pub trait ReplySocket {
    /// Send one datagram without waiting. A full send buffer surfaces as
    /// `WouldBlock`.
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

pub trait DatagramSocket: ReplySocket + Sync {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
}

impl ReplySocket for UdpSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::try_send_to(self, buf, target)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

impl DatagramSocket for UdpSocket {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        UdpSocket::send_to(self, buf, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        UdpSocket::recv_from(self, buf)
    }
}

/// Receive one datagram, or `Ok(None)` once `deadline` has passed.
///
/// The deadline is enforced even when nothing ever arrives.
pub async fn recv_until<S: DatagramSocket>(
    socket: &S,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<Option<(usize, SocketAddr)>> {
    match tokio::time::timeout_at(deadline, socket.recv_from(buf)).await {
        Ok(Ok(received)) => Ok(Some(received)),
        Ok(Err(e)) => Err(WireError::socket("recv_from", e)),
        Err(_) => Ok(None),
    }
}

/// Errors a UDP socket reports for an earlier datagram (ICMP feedback on
/// some platforms) rather than for its own state.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Bind an ephemeral UDP socket on `bind_ip` with `SO_BROADCAST` enabled.
///
/// Must be called from within a Tokio runtime.
pub fn bind_broadcast_socket(bind_ip: IpAddr) -> Result<UdpSocket> {
    let addr = SocketAddr::new(bind_ip, 0);
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| WireError::socket("socket", e))?;

    socket
        .set_broadcast(true)
        .map_err(|e| WireError::socket("set_broadcast", e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| WireError::socket("bind", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| WireError::socket("set_nonblocking", e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| WireError::socket("register", e))
}

/// Bind a UDP socket on `addr` with `SO_REUSEADDR` (and `SO_REUSEPORT` on
/// unix) so several listeners can share a discovery port.
///
/// Must be called from within a Tokio runtime.
pub fn bind_reusable_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| WireError::socket("socket", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| WireError::socket("set_reuse_address", e))?;

    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|e| WireError::socket("set_reuse_port", e))?;

    socket
        .bind(&addr.into())
        .map_err(|e| WireError::socket("bind", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| WireError::socket("set_nonblocking", e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| WireError::socket("register", e))
}

/// The `/24` and `/16` directed broadcast addresses of `ip`.
pub fn directed_broadcasts(ip: Ipv4Addr) -> [Ipv4Addr; 2] {
    let [a, b, c, _] = ip.octets();
    [Ipv4Addr::new(a, b, c, 255), Ipv4Addr::new(a, b, 255, 255)]
}

/// Addresses a discovery request is sent to, without duplicates.
///
/// Explicit targets come first. With none configured the limited broadcast
/// address is used. Interface broadcasts are appended when enabled.
pub fn broadcast_targets(config: &DiscoveryConfig) -> Vec<IpAddr> {
    let mut targets = config.broadcast_targets.clone();
    if targets.is_empty() {
        targets.push(IpAddr::V4(Ipv4Addr::BROADCAST));
    }

    if config.include_interface_broadcasts {
        for ip in interface_addresses() {
            targets.extend(directed_broadcasts(ip).map(IpAddr::V4));
        }
    }

    let mut seen = HashSet::new();
    targets.retain(|ip| seen.insert(*ip));
    targets
}

/// Non-loopback IPv4 addresses of the local interfaces.
fn interface_addresses() -> Vec<Ipv4Addr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            debug!(error = %e, "Failed to list network interfaces");
            return Vec::new();
        }
    };

    let addrs: Vec<Ipv4Addr> = interfaces
        .into_iter()
        .filter_map(|(_name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect();

    debug!(count = addrs.len(), "Discovered non-loopback interfaces");
    addrs
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration;

    #[test]
    fn directed_broadcast_addresses() {
        let [c_net, b_net] = directed_broadcasts(Ipv4Addr::new(192, 168, 4, 17));
        assert_eq!(c_net, Ipv4Addr::new(192, 168, 4, 255));
        assert_eq!(b_net, Ipv4Addr::new(192, 168, 255, 255));
    }

    #[test]
    fn explicit_targets_are_kept_in_order() {
        let config = DiscoveryConfig::with_targets([
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        ]);
        assert_eq!(
            broadcast_targets(&config),
            vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
            ]
        );
    }

    #[test]
    fn default_targets_start_with_limited_broadcast() {
        let config = DiscoveryConfig::default();
        let targets = broadcast_targets(&config);
        assert_eq!(targets[0], IpAddr::V4(Ipv4Addr::BROADCAST));
        assert!(targets.iter().all(|ip| !ip.is_loopback()));
    }

    #[tokio::test]
    async fn recv_until_returns_none_at_deadline() {
        let socket = bind_broadcast_socket(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let mut buf = [0u8; 16];
        let started = Instant::now();
        let got = recv_until(&socket, &mut buf, started + Duration::from_millis(50))
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn recv_until_delivers_datagram() {
        let rx = bind_reusable_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        let tx = bind_broadcast_socket(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let target = ReplySocket::local_addr(&rx).unwrap();
        DatagramSocket::send_to(&tx, b"ping", target).await.unwrap();

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_secs(2);
        let (len, from) = recv_until(&rx, &mut buf, deadline).await.unwrap().unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, ReplySocket::local_addr(&tx).unwrap());
    }
}
