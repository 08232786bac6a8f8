//! Typed payload exchange over any reliable byte stream.
//!
//! [`PayloadStream`] pairs a `Framed` stream with a [`WireCodec`], so the
//! owning transport sends and receives payloads instead of raw frames.
//! Frames split across reads are reassembled by [`FrameCodec`].

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::config::FramingConfig;
use crate::core::codec::{FrameCodec, WireCodec};
use crate::core::serialization::Payload;
use crate::error::{Result, WireError};
use crate::protocol::framework::{is_framework_tag, FrameworkMessage, KeepAliveCache};
use crate::utils::metrics::Metrics;

/// A frame read from the stream, classified by its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Framework(FrameworkMessage),
    User { tag: String, body: Bytes },
}

impl Received {
    /// Decode a user payload. Framework messages yield `UnexpectedType`.
    pub fn decode<T: Payload, C: WireCodec>(&self, codec: &C) -> Result<T> {
        match self {
            Received::User { body, .. } => codec.decode(body),
            Received::Framework(msg) => Err(WireError::UnexpectedType {
                expected: T::TYPE_TAG,
                found: msg.opcode().to_string(),
            }),
        }
    }
}

pub struct PayloadStream<S, C> {
    framed: Framed<S, FrameCodec<C>>,
    keep_alive: KeepAliveCache,
    metrics: Arc<Metrics>,
}

impl<S, C> PayloadStream<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: WireCodec,
{
    pub fn new(stream: S, codec: C) -> Self {
        Self::with_frame_codec(stream, FrameCodec::new(codec))
    }

    pub fn from_config(stream: S, codec: C, config: &FramingConfig) -> Self {
        Self::with_frame_codec(stream, FrameCodec::from_config(codec, config))
    }

    fn with_frame_codec(stream: S, frames: FrameCodec<C>) -> Self {
        Self {
            framed: Framed::new(stream, frames),
            keep_alive: KeepAliveCache::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share a metrics collector with other components.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn codec(&self) -> &C {
        self.framed.codec().codec()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }

    /// Encode `payload` and write it as one frame.
    pub async fn send<T: Payload>(&mut self, payload: &T) -> Result<()> {
        let body = self.codec().encode(payload);
        self.metrics.payload_encoded(body.is_ok());
        self.send_body(body?).await
    }

    /// Write an already encoded body as one frame.
    pub async fn send_body(&mut self, body: Bytes) -> Result<()> {
        let len = body.len();
        self.framed.send(body).await?;
        self.metrics.frame_sent(len as u64);
        trace!(body_len = len, "Sent frame");
        Ok(())
    }

    /// Send a keep-alive, encoded once per stream.
    pub async fn send_keep_alive(&mut self) -> Result<()> {
        let body = self.keep_alive.get(self.framed.codec().codec())?;
        self.send_body(body).await
    }

    /// Next frame body, or `None` once the peer closed the stream cleanly.
    pub async fn recv_body(&mut self) -> Result<Option<Bytes>> {
        match self.framed.next().await {
            Some(Ok(body)) => {
                self.metrics.frame_received(body.len() as u64);
                Ok(Some(body))
            }
            Some(Err(e)) => Err(e),
            None => {
                debug!("Stream closed by peer");
                Ok(None)
            }
        }
    }

    /// Next frame decoded as `T`.
    pub async fn recv<T: Payload>(&mut self) -> Result<Option<T>> {
        let Some(body) = self.recv_body().await? else {
            return Ok(None);
        };
        let payload = self.codec().decode(&body);
        self.metrics.payload_decoded(payload.is_ok());
        payload.map(Some)
    }

    /// Next frame, with framework messages decoded and user payloads left
    /// as tagged bodies.
    pub async fn recv_any(&mut self) -> Result<Option<Received>> {
        let Some(body) = self.recv_body().await? else {
            return Ok(None);
        };

        let tag = self.codec().type_tag(&body)?;
        if is_framework_tag(tag) {
            let message = self.codec().decode::<FrameworkMessage>(&body);
            self.metrics.payload_decoded(message.is_ok());
            return message.map(|m| Some(Received::Framework(m)));
        }

        Ok(Some(Received::User {
            tag: tag.to_string(),
            body,
        }))
    }
}
