//! Deadlines used across the crate and a small wrapper for bounding futures.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, WireError};

/// Default window a discovery request listens for replies.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound accepted for a discovery window.
pub const MAX_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a responder waits for its task to finish after a stop signal.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// Roughly 30 years; stands in for "never" when a deadline would overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Compute a deadline `timeout` from now. A timeout too large to represent
/// becomes a deadline far in the future rather than a shorter one.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Run `fut` to completion or fail with a `TimedOut` socket error.
pub async fn with_timeout<F, T>(op: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(WireError::socket(
            op,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let value = with_timeout("noop", Duration::from_millis(100), async { Ok(7) }).await;
        assert_eq!(value.ok(), Some(7));
    }

    #[tokio::test]
    async fn slow_future_times_out() {
        let result: Result<()> = with_timeout("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        match result {
            Err(WireError::Socket { op, source }) => {
                assert_eq!(op, "sleep");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn deadline_is_in_the_future() {
        let before = Instant::now();
        assert!(deadline_after(Duration::from_millis(50)) > before);
    }

    #[test]
    fn huge_timeout_is_not_shortened() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > before + Duration::from_secs(86_400 * 365));
    }
}
