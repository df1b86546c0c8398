//! Retrying transactional writer.
//!
//! SQLite reports lock contention as a "database is locked" error at commit
//! time when the serving API holds a write transaction. Those commits are
//! rolled back and retried with exponential backoff; any other database
//! error propagates immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the retrying writer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("gave up after {attempts} attempts: database still locked")]
    RetryExhausted { attempts: u32 },
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Worst case total wait ~1+2+4+8+16 s before the sixth attempt.
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// True for SQLite busy/locked conditions, the only retryable failures.
pub fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let msg = db.message().to_ascii_lowercase();
            msg.contains("database is locked")
                || msg.contains("database table is locked")
                || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// attempt budget is spent.
///
/// The closure must begin its own transaction on every call; a failed
/// attempt's transaction is rolled back when it is dropped.
pub async fn with_retry<T, F, Fut, P>(
    policy: RetryPolicy,
    name: &str,
    retryable: P,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
    P: Fn(&sqlx::Error) -> bool,
{
    let mut delay = policy.base_delay;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = name, attempt, "Commit succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if retryable(&e) => {
                if attempt == policy.max_attempts {
                    break;
                }
                warn!(
                    operation = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Database locked, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
    }

    Err(StoreError::RetryExhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let result = with_retry(fast_policy(6), "test", is_busy, || async {
            Ok::<_, sqlx::Error>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Cell::new(0u32);
        let result = with_retry(
            fast_policy(6),
            "test",
            |e| matches!(e, sqlx::Error::PoolTimedOut),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(sqlx::Error::PoolTimedOut)
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = Cell::new(0u32);
        let result = with_retry(
            fast_policy(6),
            "test",
            |e| matches!(e, sqlx::Error::PoolTimedOut),
            || {
                calls.set(calls.get() + 1);
                async { Err::<i32, _>(sqlx::Error::RowNotFound) }
            },
        )
        .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_a_terminal_error() {
        let calls = Cell::new(0u32);
        let result = with_retry(
            fast_policy(4),
            "test",
            |e| matches!(e, sqlx::Error::PoolTimedOut),
            || {
                calls.set(calls.get() + 1);
                async { Err::<i32, _>(sqlx::Error::PoolTimedOut) }
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(StoreError::RetryExhausted { attempts: 4 })
        ));
        assert_eq!(calls.get(), 4);
    }
}
