//! Server side of host discovery.
//!
//! A [`DiscoveryResponder`] listens on the discovery port and answers each
//! `DiscoverHost` request through its [`ServerDiscoveryHandler`]. One bad
//! datagram never stops the loop; only the stop signal does.

use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{DiscoveryConfig, DEFAULT_REPLY_BUFFER_SIZE};
use crate::core::codec::WireCodec;
use crate::core::serialization::Payload;
use crate::discovery::socket::{bind_reusable_socket, is_transient, ReplySocket};
use crate::error::{Result, WireError};
use crate::protocol::framework::{is_framework_tag, FrameworkMessage};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout, SHUTDOWN_TIMEOUT};

/// Server discovery policy.
///
/// Called once per well-formed `DiscoverHost` request. The policy sends its
/// own reply through `socket`; returning `Ok(false)` means no reply was sent.
pub trait ServerDiscoveryHandler: Send + Sync {
    fn on_discover_host<C: WireCodec>(
        &self,
        socket: &dyn ReplySocket,
        from: SocketAddr,
        codec: &C,
    ) -> Result<bool>;
}

/// Send one reply datagram without waiting on the socket.
pub fn send_reply(socket: &dyn ReplySocket, body: &[u8], to: SocketAddr) -> Result<usize> {
    socket
        .try_send_to(body, to)
        .map_err(|e| WireError::socket("try_send_to", e))
}

/// Answers every request with an empty datagram.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDiscoveryHandler;

impl ServerDiscoveryHandler for DefaultDiscoveryHandler {
    fn on_discover_host<C: WireCodec>(
        &self,
        socket: &dyn ReplySocket,
        from: SocketAddr,
        _codec: &C,
    ) -> Result<bool> {
        send_reply(socket, &[], from)?;
        Ok(true)
    }
}

/// Never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl ServerDiscoveryHandler for RejectAll {
    fn on_discover_host<C: WireCodec>(
        &self,
        _socket: &dyn ReplySocket,
        _from: SocketAddr,
        _codec: &C,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Answers every request with the same encoded payload.
#[derive(Debug, Clone)]
pub struct PayloadReply<T> {
    payload: T,
}

impl<T: Payload + Send + Sync> PayloadReply<T> {
    pub fn new(payload: T) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }
}

impl<T: Payload + Send + Sync> ServerDiscoveryHandler for PayloadReply<T> {
    fn on_discover_host<C: WireCodec>(
        &self,
        socket: &dyn ReplySocket,
        from: SocketAddr,
        codec: &C,
    ) -> Result<bool> {
        let body = codec.encode(&self.payload)?;
        send_reply(socket, &body, from)?;
        Ok(true)
    }
}

/// Builds the reply per requester. `None` declines the request.
pub struct ReplyWith<F, T> {
    reply: F,
    _payload: PhantomData<fn() -> T>,
}

impl<F, T> ReplyWith<F, T>
where
    F: Fn(SocketAddr) -> Option<T> + Send + Sync,
    T: Payload,
{
    pub fn new(reply: F) -> Self {
        Self {
            reply,
            _payload: PhantomData,
        }
    }
}

impl<F, T> ServerDiscoveryHandler for ReplyWith<F, T>
where
    F: Fn(SocketAddr) -> Option<T> + Send + Sync,
    T: Payload,
{
    fn on_discover_host<C: WireCodec>(
        &self,
        socket: &dyn ReplySocket,
        from: SocketAddr,
        codec: &C,
    ) -> Result<bool> {
        let Some(payload) = (self.reply)(from) else {
            return Ok(false);
        };
        let body = codec.encode(&payload)?;
        send_reply(socket, &body, from)?;
        Ok(true)
    }
}

/// Reply socket that counts what policies send.
struct CountingSocket<'a> {
    inner: &'a UdpSocket,
    metrics: &'a Metrics,
}

impl ReplySocket for CountingSocket<'_> {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let sent = self.inner.try_send_to(buf, target)?;
        self.metrics.reply_sent(sent as u64);
        Ok(sent)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Listens for discovery requests and answers them.
#[derive(Debug)]
pub struct DiscoveryResponder<C, H> {
    socket: UdpSocket,
    codec: C,
    handler: H,
    metrics: Arc<Metrics>,
    buffer_size: usize,
}

impl<C, H> DiscoveryResponder<C, H>
where
    C: WireCodec,
    H: ServerDiscoveryHandler,
{
    /// Bind the discovery socket on `addr`. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, codec: C, handler: H) -> Result<Self> {
        let socket = bind_reusable_socket(addr)?;
        info!(addr = %socket.local_addr()?, "Discovery responder bound");
        Ok(Self {
            socket,
            codec,
            handler,
            metrics: Arc::new(Metrics::new()),
            buffer_size: DEFAULT_REPLY_BUFFER_SIZE,
        })
    }

    /// Bind on the configured address and port.
    pub async fn from_config(config: &DiscoveryConfig, codec: C, handler: H) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let mut responder = Self::bind(addr, codec, handler).await?;
        responder.buffer_size = config.reply_buffer_size;
        Ok(responder)
    }

    /// Share a metrics collector with other components.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| WireError::socket("local_addr", e))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serve requests until `shutdown` receives a value or all its senders
    /// are dropped.
    #[instrument(skip(self, shutdown), fields(addr = ?self.socket.local_addr().ok()))]
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Discovery responder shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) => self.handle_datagram(&buf[..len], from),
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Ignoring transient receive error");
                }
                Err(e) => {
                    warn!(error = %e, "Discovery responder socket failed");
                    return Err(WireError::socket("recv_from", e));
                }
            }
        }

        self.metrics.log_summary();
        Ok(())
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        self.metrics.discovery_request_received(datagram.len() as u64);

        let tag = match self.codec.type_tag(datagram) {
            Ok(tag) => tag,
            Err(e) => {
                self.metrics.malformed_datagram();
                debug!(%from, error = %e, "Dropping malformed datagram");
                return;
            }
        };
        if !is_framework_tag(tag) {
            trace!(%from, tag, "Ignoring non-framework datagram");
            return;
        }

        let message = self.codec.decode::<FrameworkMessage>(datagram);
        self.metrics.payload_decoded(message.is_ok());
        match message {
            Ok(FrameworkMessage::DiscoverHost) => {}
            Ok(other) => {
                trace!(%from, opcode = other.opcode(), "Ignoring framework message");
                return;
            }
            Err(e) => {
                self.metrics.malformed_datagram();
                debug!(%from, error = %e, "Dropping malformed framework message");
                return;
            }
        }

        let socket = CountingSocket {
            inner: &self.socket,
            metrics: &self.metrics,
        };
        match self.handler.on_discover_host(&socket, from, &self.codec) {
            Ok(true) => debug!(%from, "Answered discovery request"),
            Ok(false) => {
                self.metrics.discovery_request_rejected();
                debug!(%from, "Discovery request declined");
            }
            Err(e) => {
                self.metrics.discovery_request_rejected();
                warn!(%from, error = %e, "Discovery handler failed");
            }
        }
    }
}

impl<C, H> DiscoveryResponder<C, H>
where
    C: WireCodec + 'static,
    H: ServerDiscoveryHandler + 'static,
{
    /// Run the responder on its own task.
    pub fn spawn(self) -> Result<ResponderHandle> {
        let local_addr = self.local_addr()?;
        let metrics = Arc::clone(&self.metrics);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });

        Ok(ResponderHandle {
            local_addr,
            metrics,
            shutdown_tx,
            join,
        })
    }
}

/// Handle to a spawned responder.
#[derive(Debug)]
pub struct ResponderHandle {
    local_addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<Result<()>>,
}

impl ResponderHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Signal the responder to stop and wait for its task to finish.
    pub async fn stop(self) -> Result<()> {
        // A closed channel means the task has already exited.
        let _ = self.shutdown_tx.send(()).await;
        with_timeout("shutdown", SHUTDOWN_TIMEOUT, async {
            match self.join.await {
                Ok(result) => result,
                Err(e) => Err(WireError::Io(io::Error::other(e.to_string()))),
            }
        })
        .await
    }
}
