use crate::Unrecoverable;
use rand::Rng;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// The backoff schedule shared by Provider Adapters (§4.A) and Broker
/// Adapters (§4.J): base 250ms, factor 2, capped at 30s, ±20% jitter, at
/// most 5 attempts. Permanent failures (anything [`Unrecoverable`]) are
/// never retried.
#[derive(Debug, Copy, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            factor: 2,
            cap: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the `attempt`'th retry (`attempt` is 1-indexed: the
    /// delay preceding the *second* overall try).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        let nominal = self.base.saturating_mul(exp).min(self.cap);
        let mut rng = rand::rng();
        let jitter_frac = rng.random_range(-self.jitter..=self.jitter);
        let millis = (nominal.as_millis() as f64 * (1.0 + jitter_frac)).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

/// Run `op` under [`BackoffPolicy`], retrying transient failures and
/// surfacing the first error once `op` returns an [`Unrecoverable`] error or
/// attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(policy: BackoffPolicy, mut op: F) -> Result<T, E>
where
    E: Unrecoverable + Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_unrecoverable() || attempt >= policy.max_attempts => {
                return Err(err);
            }
            Err(err) => {
                warn!(?err, attempt, "transient failure, retrying after backoff");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Transient;
    impl Unrecoverable for Transient {
        fn is_unrecoverable(&self) -> bool {
            false
        }
    }

    #[derive(Debug)]
    struct Permanent;
    impl Unrecoverable for Permanent {
        fn is_unrecoverable(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            ..Default::default()
        };
        let result: Result<u32, Transient> = with_retry(policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Transient)
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent_failure() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::default();
        let result: Result<u32, Permanent> = with_retry(policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Permanent)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            max_attempts: 3,
            ..Default::default()
        };
        let result: Result<u32, Transient> = with_retry(policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Transient)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
