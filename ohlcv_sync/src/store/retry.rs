//! Exponential-backoff decorator for any [`SeriesStore`].
//!
//! Only errors for which [`Error::is_retryable`] holds are retried: an
//! unreachable store or a failed write. Delays grow as `base_delay * 2^attempt`,
//! capped at [`MAX_DELAY`].
//!
//! `replace` is forwarded without retry, so the inner store's own atomicity (or
//! lack of it) decides what a failure leaves behind.

use std::{collections::BTreeSet, future::Future, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::{
    error::Result,
    record::RowBatch,
    store::{QueryRequest, SeriesStore},
};

pub const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }
}

pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SeriesStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<'a, T, F, Fut>(&'a self, op: &str, key: &str, mut call: F) -> Result<T>
    where
        F: FnMut(&'a S) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call(&self.inner).await {
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    warn!(
                        op,
                        key,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: SeriesStore> SeriesStore for RetryingStore<S> {
    async fn write(&self, key: &str, rows: &RowBatch, variable_length: bool) -> Result<()> {
        self.run("write", key, |s| s.write(key, rows, variable_length))
            .await
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        self.run("destroy", key, |s| s.destroy(key)).await
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<RowBatch>> {
        let key = request.key();
        self.run("query", &key, |s| s.query(request)).await
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>> {
        self.run("list_symbols", "*", |s| s.list_symbols()).await
    }

    async fn server_version(&self) -> Result<String> {
        self.run("server_version", "*", |s| s.server_version()).await
    }

    async fn replace(&self, key: &str, rows: &RowBatch) -> Result<()> {
        self.inner.replace(key, rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(1), Duration::from_millis(1_000));
        assert_eq!(p.delay(3), Duration::from_millis(4_000));
        assert_eq!(p.delay(8), MAX_DELAY);
        assert_eq!(p.delay(40), MAX_DELAY);
    }
}
