//! Timeout enforcement.
//!
//! # Responsibilities
//! - Resolve the effective per-call timeout for a route
//! - Wrap downstream calls so expiry cancels the call
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the inner future cancels the call
//! - Timeout errors are distinct from transport errors
//! - Timed-out requests surface as 503 and count as breaker failures

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::QosOptions;

/// Applied when a route configures no timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Stand-in for a deadline that does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating to a far-future instant instead of overflowing.
pub fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub fn effective_timeout(options: &QosOptions) -> Duration {
    match options.timeout_ms {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => DEFAULT_TIMEOUT,
    }
}

/// Run `future` with a deadline. `None` when the deadline passed first.
pub async fn with_timeout<F: Future>(timeout: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(timeout, future).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_saturates() {
        let now = Instant::now();
        assert_eq!(deadline(now, Duration::from_secs(5)), now + Duration::from_secs(5));

        let far = deadline(now, Duration::from_secs(u64::MAX));
        assert!(far > now + Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn test_effective_timeout() {
        assert_eq!(effective_timeout(&QosOptions::default()), DEFAULT_TIMEOUT);

        let custom = QosOptions {
            timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(effective_timeout(&custom), Duration::from_millis(250));

        let zero = QosOptions {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(effective_timeout(&zero), DEFAULT_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let slow = tokio::time::sleep(Duration::from_secs(10));
        assert!(with_timeout(Duration::from_secs(1), slow).await.is_none());

        let fast = async { 7 };
        assert_eq!(with_timeout(Duration::from_secs(1), fast).await, Some(7));
    }
}
