//! Observability and Metrics
//!
//! Counters for codec, framing and discovery activity. Responders,
//! requesters and payload streams each own an `Arc<Metrics>`, which callers
//! may share between components.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for wire operations
#[derive(Debug)]
pub struct Metrics {
    /// Payloads successfully encoded
    pub payloads_encoded: AtomicU64,
    /// Payloads successfully decoded
    pub payloads_decoded: AtomicU64,
    /// Encode attempts that failed
    pub encode_failures: AtomicU64,
    /// Decode attempts that failed
    pub decode_failures: AtomicU64,
    /// Frames written to a stream
    pub frames_sent: AtomicU64,
    /// Frames read from a stream
    pub frames_received: AtomicU64,
    /// Discovery broadcasts sent (one per target)
    pub discovery_requests_sent: AtomicU64,
    /// Discovery requests received by a responder
    pub discovery_requests_received: AtomicU64,
    /// Requests a responder declined to answer
    pub discovery_requests_rejected: AtomicU64,
    /// Replies sent by a responder
    pub replies_sent: AtomicU64,
    /// Replies received by a requester
    pub replies_received: AtomicU64,
    /// Replies a requester's handler accepted
    pub replies_accepted: AtomicU64,
    /// Datagrams dropped because they could not be decoded
    pub malformed_datagrams: AtomicU64,
    /// Bytes sent on sockets and streams
    pub bytes_sent: AtomicU64,
    /// Bytes received on sockets and streams
    pub bytes_received: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            payloads_encoded: AtomicU64::new(0),
            payloads_decoded: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            discovery_requests_sent: AtomicU64::new(0),
            discovery_requests_received: AtomicU64::new(0),
            discovery_requests_rejected: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            replies_received: AtomicU64::new(0),
            replies_accepted: AtomicU64::new(0),
            malformed_datagrams: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of an encode call
    pub fn payload_encoded(&self, ok: bool) {
        if ok {
            self.payloads_encoded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.encode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of a decode call
    pub fn payload_decoded(&self, ok: bool) {
        if ok {
            self.payloads_decoded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn discovery_request_sent(&self, byte_count: u64) {
        self.discovery_requests_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn discovery_request_received(&self, byte_count: u64) {
        self.discovery_requests_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn discovery_request_rejected(&self) {
        self.discovery_requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_sent(&self, byte_count: u64) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn reply_received(&self, byte_count: u64) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn reply_accepted(&self) {
        self.replies_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_datagram(&self) {
        self.malformed_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            payloads_encoded: self.payloads_encoded.load(Ordering::Relaxed),
            payloads_decoded: self.payloads_decoded.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            discovery_requests_sent: self.discovery_requests_sent.load(Ordering::Relaxed),
            discovery_requests_received: self.discovery_requests_received.load(Ordering::Relaxed),
            discovery_requests_rejected: self.discovery_requests_rejected.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
            replies_accepted: self.replies_accepted.load(Ordering::Relaxed),
            malformed_datagrams: self.malformed_datagrams.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            payloads_encoded = snapshot.payloads_encoded,
            payloads_decoded = snapshot.payloads_decoded,
            encode_failures = snapshot.encode_failures,
            decode_failures = snapshot.decode_failures,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            discovery_requests_sent = snapshot.discovery_requests_sent,
            discovery_requests_received = snapshot.discovery_requests_received,
            discovery_requests_rejected = snapshot.discovery_requests_rejected,
            replies_sent = snapshot.replies_sent,
            replies_received = snapshot.replies_received,
            replies_accepted = snapshot.replies_accepted,
            malformed_datagrams = snapshot.malformed_datagrams,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            uptime_seconds = snapshot.uptime_seconds,
            "Wire metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub payloads_encoded: u64,
    pub payloads_decoded: u64,
    pub encode_failures: u64,
    pub decode_failures: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub discovery_requests_sent: u64,
    pub discovery_requests_received: u64,
    pub discovery_requests_rejected: u64,
    pub replies_sent: u64,
    pub replies_received: u64,
    pub replies_accepted: u64,
    pub malformed_datagrams: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
