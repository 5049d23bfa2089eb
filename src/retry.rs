use crate::error::Error;
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Failures that know whether repeating the call may help.
pub trait Retryable: Display + Sized {
    fn is_transient(&self) -> bool;

    /// Error reported once the retry budget is spent.
    fn exhausted(attempts: u32, last: Self) -> Self;
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        Error::is_transient(self)
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        Error::RetriesExhausted {
            attempts,
            last: last.to_string(),
        }
    }
}

/// Exponential backoff with uniform jitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 750,
            jitter_ms: 400,
        }
    }
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    return Err(E::exhausted(attempt + 1, e));
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    warn!(
                        "{what}: attempt {} failed ({e}), retrying in {}ms",
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_transient_is_retried() {
        let calls = Cell::new(0);
        let res: Result<u32, Error> = quick(3)
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(Error::Transient("429".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = Cell::new(0);
        let res: Result<(), Error> = quick(5)
            .run("fatal", || {
                calls.set(calls.get() + 1);
                async { Err(Error::Fatal("bad request".into())) }
            })
            .await;
        assert!(matches!(res, Err(Error::Fatal(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let calls = Cell::new(0);
        let res: Result<(), Error> = quick(2)
            .run("down", || {
                calls.set(calls.get() + 1);
                async { Err(Error::Transient("503".into())) }
            })
            .await;
        assert!(matches!(
            res,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_delay_grows() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            jitter_ms: 0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }
}
