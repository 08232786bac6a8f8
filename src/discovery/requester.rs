//! Client side of host discovery.
//!
//! A [`DiscoveryRequester`] broadcasts one encoded `DiscoverHost` request
//! and listens until its deadline. Every reply is offered to a
//! [`ClientDiscoveryHandler`], which decides whether it names a usable host.

use std::io;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::core::codec::WireCodec;
use crate::core::serialization::Payload;
use crate::discovery::socket::{
    bind_broadcast_socket, broadcast_targets, is_transient, recv_until, DatagramSocket,
};
use crate::discovery::{DiscoveredHost, Endpoint};
use crate::error::{constants, Result, WireError};
use crate::protocol::framework::FrameworkMessage;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::deadline_after;

/// Client discovery policy.
///
/// Every method has a default, so a unit struct implementing the trait
/// accepts the first server that answers.
pub trait ClientDiscoveryHandler: Send {
    /// Buffer the next reply is received into. Datagrams longer than the
    /// buffer are truncated by the OS.
    fn on_request_buffer(&mut self, reply_buffer_size: usize) -> Vec<u8> {
        vec![0u8; reply_buffer_size]
    }

    /// Inspect one reply. `Ok(true)` accepts the host, `Ok(false)` skips it.
    /// Errors are logged and the reply is skipped.
    fn on_discovered_host<C: WireCodec>(&mut self, host: &DiscoveredHost, codec: &C) -> Result<bool> {
        let _ = (host, codec);
        Ok(true)
    }

    /// Pick one host out of everything accepted in collect-all mode.
    fn select_host(&mut self, hosts: Vec<DiscoveredHost>) -> Option<DiscoveredHost> {
        hosts.into_iter().next()
    }

    /// Runs exactly once when the operation ends, whatever the outcome.
    fn on_finally(&mut self) {}
}

/// Accepts every reply, including the empty default one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientDiscoveryHandler;

impl ClientDiscoveryHandler for DefaultClientDiscoveryHandler {}

/// Accepts replies that decode as `T` and keeps the decoded values.
#[derive(Debug)]
pub struct ExpectPayload<T> {
    received: Vec<(Endpoint, T)>,
    finished: bool,
}

impl<T> Default for ExpectPayload<T> {
    fn default() -> Self {
        Self {
            received: Vec::new(),
            finished: false,
        }
    }
}

impl<T: Payload + Send> ExpectPayload<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> &[(Endpoint, T)] {
        &self.received
    }

    pub fn into_received(self) -> Vec<(Endpoint, T)> {
        self.received
    }

    /// Whether the discovery operation this handler served has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<T: Payload + Send> ClientDiscoveryHandler for ExpectPayload<T> {
    fn on_discovered_host<C: WireCodec>(&mut self, host: &DiscoveredHost, codec: &C) -> Result<bool> {
        let payload = host.decode::<T, C>(codec)?;
        self.received.push((host.endpoint, payload));
        Ok(true)
    }

    fn on_finally(&mut self) {
        self.finished = true;
    }
}

/// Calls `on_finally` when dropped, so cleanup runs on success, error and
/// cancellation alike.
struct FinallyGuard<'a, H: ClientDiscoveryHandler> {
    handler: &'a mut H,
}

impl<'a, H: ClientDiscoveryHandler> FinallyGuard<'a, H> {
    fn new(handler: &'a mut H) -> Self {
        Self { handler }
    }
}

impl<H: ClientDiscoveryHandler> Deref for FinallyGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handler
    }
}

impl<H: ClientDiscoveryHandler> DerefMut for FinallyGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handler
    }
}

impl<H: ClientDiscoveryHandler> Drop for FinallyGuard<'_, H> {
    fn drop(&mut self) {
        self.handler.on_finally();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collect {
    First,
    All,
}

/// Broadcasts discovery requests and gathers replies.
#[derive(Debug)]
pub struct DiscoveryRequester<C> {
    codec: C,
    config: DiscoveryConfig,
    metrics: Arc<Metrics>,
}

impl<C: WireCodec> DiscoveryRequester<C> {
    pub fn new(codec: C, config: DiscoveryConfig) -> Self {
        Self {
            codec,
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share a metrics collector with other components.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Look for a server on `port`, waiting at most `timeout`.
    ///
    /// In [`DiscoveryMode::FirstReply`] the first accepted reply is returned
    /// as soon as it arrives. In [`DiscoveryMode::CollectAll`] the whole
    /// window is used and the handler's `select_host` picks the result.
    /// `Ok(None)` means no server answered in time.
    #[instrument(skip(self, handler), fields(mode = ?self.config.mode))]
    pub async fn discover_host<H: ClientDiscoveryHandler>(
        &self,
        port: u16,
        timeout: Duration,
        handler: &mut H,
    ) -> Result<Option<DiscoveredHost>> {
        let mut handler = FinallyGuard::new(handler);
        match self.config.mode {
            DiscoveryMode::FirstReply => {
                let mut hosts = self.discover(port, timeout, &mut *handler, Collect::First).await?;
                Ok(hosts.pop())
            }
            DiscoveryMode::CollectAll => {
                let hosts = self.discover(port, timeout, &mut *handler, Collect::All).await?;
                if hosts.is_empty() {
                    return Ok(None);
                }
                Ok(handler.select_host(hosts))
            }
        }
    }

    /// Listen for the whole window and return every accepted host, in
    /// arrival order.
    #[instrument(skip(self, handler))]
    pub async fn discover_hosts<H: ClientDiscoveryHandler>(
        &self,
        port: u16,
        timeout: Duration,
        handler: &mut H,
    ) -> Result<Vec<DiscoveredHost>> {
        let mut handler = FinallyGuard::new(handler);
        self.discover(port, timeout, &mut *handler, Collect::All).await
    }

    /// [`discover_host`](Self::discover_host) with the configured port and
    /// timeout.
    pub async fn discover_configured<H: ClientDiscoveryHandler>(
        &self,
        handler: &mut H,
    ) -> Result<Option<DiscoveredHost>> {
        self.discover_host(self.config.port, self.config.timeout, handler)
            .await
    }

    /// Run `discover_host` on its own task. The handler is handed back with
    /// the result.
    pub fn spawn_discover_host<H>(
        self,
        port: u16,
        timeout: Duration,
        mut handler: H,
    ) -> JoinHandle<(Result<Option<DiscoveredHost>>, H)>
    where
        C: 'static,
        H: ClientDiscoveryHandler + 'static,
    {
        tokio::spawn(async move {
            let result = self.discover_host(port, timeout, &mut handler).await;
            (result, handler)
        })
    }

    async fn discover<H: ClientDiscoveryHandler>(
        &self,
        port: u16,
        timeout: Duration,
        handler: &mut H,
        collect: Collect,
    ) -> Result<Vec<DiscoveredHost>> {
        let _timer = Timer::start("discover");
        let socket = bind_broadcast_socket(self.config.bind_address)?;
        let request = self.codec.encode(&FrameworkMessage::DiscoverHost);
        self.metrics.payload_encoded(request.is_ok());
        let request = request?;

        let started = Instant::now();
        let deadline = deadline_after(timeout);
        self.broadcast(&socket, &request, port).await?;
        self.collect_replies(&socket, started, deadline, handler, collect)
            .await
    }

    async fn broadcast<S: DatagramSocket>(&self, socket: &S, request: &Bytes, port: u16) -> Result<usize> {
        let mut sent = 0usize;
        let mut last_error = None;

        for ip in broadcast_targets(&self.config) {
            let target = SocketAddr::new(ip, port);
            match socket.send_to(request, target).await {
                Ok(len) => {
                    sent += 1;
                    self.metrics.discovery_request_sent(len as u64);
                    trace!(%target, "Sent discovery request");
                }
                Err(e) => {
                    debug!(%target, error = %e, "Discovery request not sent");
                    last_error = Some(e);
                }
            }
        }

        if sent == 0 {
            let source = last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, constants::ERR_NO_BROADCAST_SENT)
            });
            return Err(WireError::socket("send_to", source));
        }

        debug!(sent, port, "Broadcast discovery request");
        Ok(sent)
    }

    async fn collect_replies<S, H>(
        &self,
        socket: &S,
        started: Instant,
        deadline: Instant,
        handler: &mut H,
        collect: Collect,
    ) -> Result<Vec<DiscoveredHost>>
    where
        S: DatagramSocket,
        H: ClientDiscoveryHandler,
    {
        let mut hosts: Vec<DiscoveredHost> = Vec::new();

        loop {
            let mut buf = handler.on_request_buffer(self.config.reply_buffer_size);
            if buf.is_empty() {
                buf.resize(self.config.reply_buffer_size, 0);
            }

            let (len, from) = match recv_until(socket, &mut buf, deadline).await {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(WireError::Socket { source, .. }) if is_transient(&source) => {
                    debug!(error = %source, "Ignoring transient receive error");
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.metrics.reply_received(len as u64);

            let endpoint = Endpoint::from(from);
            if self.config.dedupe_by_endpoint && hosts.iter().any(|h| h.endpoint == endpoint) {
                trace!(%endpoint, "Skipping repeat reply");
                continue;
            }

            buf.truncate(len);
            let host = DiscoveredHost {
                endpoint,
                payload: Bytes::from(buf),
                elapsed: started.elapsed(),
            };

            match handler.on_discovered_host(&host, &self.codec) {
                Ok(true) => {
                    self.metrics.reply_accepted();
                    debug!(%endpoint, elapsed_ms = host.elapsed.as_millis(), "Discovered host");
                    hosts.push(host);
                    if collect == Collect::First {
                        break;
                    }
                }
                Ok(false) => trace!(%endpoint, "Reply rejected by handler"),
                Err(e) => {
                    if e.is_payload_error() {
                        self.metrics.malformed_datagram();
                    }
                    warn!(%endpoint, error = %e, "Failed to handle discovery reply");
                }
            }
        }

        if hosts.is_empty() {
            debug!("No host answered before the deadline");
        }
        Ok(hosts)
    }
}

/// Handler that keeps the fastest reply in collect-all mode.
#[derive(Debug, Default)]
pub struct Fastest<H = DefaultClientDiscoveryHandler> {
    inner: H,
}

impl<H: ClientDiscoveryHandler> Fastest<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: ClientDiscoveryHandler> ClientDiscoveryHandler for Fastest<H> {
    fn on_request_buffer(&mut self, reply_buffer_size: usize) -> Vec<u8> {
        self.inner.on_request_buffer(reply_buffer_size)
    }

    fn on_discovered_host<C: WireCodec>(&mut self, host: &DiscoveredHost, codec: &C) -> Result<bool> {
        self.inner.on_discovered_host(host, codec)
    }

    fn select_host(&mut self, hosts: Vec<DiscoveredHost>) -> Option<DiscoveredHost> {
        hosts.into_iter().min_by_key(|h| h.elapsed)
    }

    fn on_finally(&mut self) {
        self.inner.on_finally();
    }
}
