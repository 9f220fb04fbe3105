//! Connection establishment with exponential backoff.
//!
//! Only failures that classify as backend resource exhaustion are
//! retried; anything else fails immediately. The socket from a failed
//! attempt is fully torn down before the next one.

use std::future::Future;
use std::time::Duration;

use crate::client::VoiceLiveClient;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before attempt N+1 is `base_delay * 2^N`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Connect and wait for the session to become ready, retrying
/// resource-exhaustion failures with exponential backoff.
///
/// # Errors
/// Returns the first non-retryable error as-is, or `RetriesExhausted`
/// naming the attempt count once every attempt has failed.
pub async fn establish(config: &ConnectionConfig, policy: RetryPolicy) -> Result<VoiceLiveClient> {
    with_backoff(policy, || async move {
        let client = VoiceLiveClient::connect(config).await?;
        match client.wait_for_ready().await {
            Ok(()) => Ok(client),
            Err(err) => {
                let _ = client.close().await;
                Err(err)
            }
        }
    })
    .await
}

async fn with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total_attempts = policy.max_retries + 1;
    let mut last_failure = String::new();

    for attempt in 0..total_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_resource_exhausted() => {
                last_failure = err.to_string();
                if attempt + 1 < total_attempts {
                    let delay = policy.base_delay * 2u32.pow(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        total_attempts,
                        ?delay,
                        "connection attempt failed ({last_failure}); backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => {
                tracing::error!("connection attempt failed with non-retryable error: {err}");
                return Err(err);
            }
        }
    }

    Err(Error::RetriesExhausted {
        attempts: total_attempts,
        last: last_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionErrorKind;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn overloaded() -> Error {
        Error::Connection {
            kind: ConnectionErrorKind::Handshake,
            message: "backend overloaded".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delays_double_and_aggregate_error_names_attempts() {
        let starts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        };

        let recorded = Arc::clone(&starts);
        let err = with_backoff::<(), _, _>(policy, move || {
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().unwrap().push(Instant::now());
                Err(overloaded())
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(last.contains("overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 4);
        let gaps: Vec<u64> = starts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![2000, 4000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failures_surface_immediately() {
        let calls = Arc::new(Mutex::new(0u32));
        let policy = RetryPolicy::default();

        let counted = Arc::clone(&calls);
        let err = with_backoff::<(), _, _>(policy, move || {
            let counted = Arc::clone(&counted);
            async move {
                *counted.lock().unwrap() += 1;
                Err(Error::Connection {
                    kind: ConnectionErrorKind::Handshake,
                    message: "invalid api key".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_once_the_backend_has_capacity() {
        let calls = Arc::new(Mutex::new(0u32));
        let policy = RetryPolicy::default();

        let counted = Arc::clone(&calls);
        let value = with_backoff(policy, move || {
            let counted = Arc::clone(&counted);
            async move {
                let mut calls = counted.lock().unwrap();
                *calls += 1;
                if *calls < 3 { Err(overloaded()) } else { Ok(42) }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
