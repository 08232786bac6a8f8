//! # Utility Modules
//!
//! Supporting utilities shared by the codec, framing and discovery layers.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` installation from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: thread-safe observability counters
//! - **Timeout**: deadline constants and async timeout wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
