//! Retry with class-aware exponential backoff and jitter.
//!
//! [`retry_with_backoff`] wraps one logical upstream call. The backoff
//! schedule depends on how [`Classifier`] classifies each failure:
//! transient network/5xx errors use the standard base, HTTP 403 auth races
//! use a longer base before escalating to [`ClientError::Auth`], and
//! third-party interference retries almost immediately on a fixed delay.

use std::future::Future;
use std::time::Duration;

use crate::classify::{Classifier, RetryClass};
use crate::error::ClientError;

/// Fixed delay before retrying an interference-classified failure.
const INTERFERENCE_BACKOFF_MS: u64 = 300;

#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Base for the extended 403 auth-race schedule.
    pub auth_backoff_base_ms: u64,
}

impl RetryPolicy {
    /// Computes the jittered delay before retry number `attempt` (1-based)
    /// for the given class: `min(base * 2^(attempt-1), cap) ± 25%`.
    fn delay_ms(&self, class: RetryClass, attempt: u32) -> u64 {
        let base = match class {
            RetryClass::AuthRace => self.auth_backoff_base_ms,
            RetryClass::ThirdParty => return INTERFERENCE_BACKOFF_MS,
            RetryClass::Transient | RetryClass::NoRetry => self.backoff_base_ms,
        };
        let computed = base.saturating_mul(1u64 << (attempt - 1).min(10));
        let capped = computed.min(self.backoff_cap_ms);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        jittered
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts.
///
/// An exhausted auth race (HTTP 403 on every attempt) is escalated to
/// [`ClientError::Auth`]; all other exhausted or non-retriable errors are
/// returned as classified.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    classifier: &Classifier,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = classifier.retry_class(&err);
                if class == RetryClass::NoRetry || attempt >= policy.max_retries {
                    return Err(escalate(err, class));
                }
                attempt += 1;
                let delay_ms = policy.delay_ms(class, attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    class = ?class,
                    error = %err,
                    "transient upstream error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Maps an exhausted 403 auth race to the hard auth error; everything else
/// passes through unchanged.
fn escalate(err: ClientError, class: RetryClass) -> ClientError {
    match (class, err) {
        (RetryClass::AuthRace, ClientError::HttpStatus { url, .. }) => ClientError::Auth { url },
        (_, err) => err,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 0,
            backoff_cap_ms: 0,
            auth_backoff_base_ms: 0,
        }
    }

    fn status(code: u16) -> ClientError {
        ClientError::HttpStatus {
            status: code,
            url: "https://shop.example.com/wp-json/wc/v3/products".to_owned(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ClientError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(status(503))
                } else {
                    Ok::<u32, ClientError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_bad_request() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(status(400))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ClientError::HttpStatus { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn exhausted_auth_race_escalates_to_auth_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(2), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(status(403))
            }
        })
        .await;
        // 2 retries → 3 total attempts, then escalation.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ClientError::Auth { .. })));
    }

    #[tokio::test]
    async fn recovered_auth_race_is_not_escalated() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(status(403))
                } else {
                    Ok::<u32, ClientError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_third_party_interference() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(1), &Classifier::default(), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ClientError::ThirdPartyInterference {
                        detail: "gtag is not defined".to_owned(),
                    })
                } else {
                    Ok::<u32, ClientError>(1)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
