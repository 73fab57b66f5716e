//! Bounded exponential back-off for database "busy"/"locked" contention,
//! mirroring the client runtime's `calculate_backoff` idiom.

use std::future::Future;
use std::time::Duration;

use tracing::{trace, warn};

use crate::store::StoreError;

/// Retries `op` while it reports `StoreError::Contention`, waiting
/// `50 * 2^attempt` ms between attempts. Any other error is returned
/// immediately. Exhausting `max_retries` returns the last contention error.
pub async fn retry_on_contention<T, F, Fut>(
    max_retries: u32,
    label: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(StoreError::Contention(msg)) if attempt < max_retries => {
                let backoff_ms = 50u64.saturating_mul(1u64 << attempt);
                trace!(attempt, backoff_ms, label, "retrying after contention: {msg}");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(StoreError::Contention(msg)) => {
                warn!(attempt, label, "exhausted retries on contention: {msg}");
                return Err(StoreError::Contention(msg));
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_contention() {
        let attempts = AtomicU32::new(0);
        let result = retry_on_contention(5, "test", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(StoreError::Contention("busy".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let result: Result<(), StoreError> =
            retry_on_contention(2, "test", || async { Err(StoreError::Contention("busy".into())) })
                .await;
        assert!(matches!(result, Err(StoreError::Contention(_))));
    }

    #[tokio::test]
    async fn non_contention_errors_bypass_retry() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), StoreError> = retry_on_contention(5, "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("agent".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
