//! Capped retry for manual refetches
//!
//! Filter-driven fetches never retry automatically (a transient backend
//! blip would otherwise trigger a synchronized retry storm across every
//! section). A user-initiated refetch gets a small number of attempts
//! with short backoff.

use std::future::Future;
use std::time::Duration;

use super::error::FetchError;

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250u64.saturating_mul(1 << attempt.min(4)))
}

/// Run `op` up to `max_attempts` times, stopping early on success or on
/// supersession (retrying a cancelled request would race the newer one).
pub async fn with_attempts<F, Fut>(max_attempts: u32, mut op: F) -> Result<(), FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), FetchError>>,
{
    let attempts = max_attempts.max(1);
    let mut last = FetchError::Backend("no attempt made".to_string());
    for attempt in 1..=attempts {
        match op().await {
            Ok(()) => return Ok(()),
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => {
                log::warn!("fetch attempt {}/{} failed: {}", attempt, attempts, e);
                last = e;
                if attempt < attempts {
                    tokio::time::sleep(backoff(attempt - 1)).await;
                }
            }
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_extra_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_attempts(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_the_cap_then_reports_the_last_error() {
        let calls = AtomicU32::new(0);
        let result = with_attempts(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(FetchError::Backend(format!("boom {n}"))) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(FetchError::Backend(msg)) => assert_eq!(msg, "boom 2"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_later_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_attempts(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::Timeout("slow".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn supersession_stops_the_loop_immediately() {
        let calls = AtomicU32::new(0);
        let result = with_attempts(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Cancelled) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
