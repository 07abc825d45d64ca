use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ohlcv_sync::{
    Error, Result,
    key::SeriesKey,
    record::{RecordSchema, RowBatch},
    store::{MemoryStore, QueryRequest, RetryPolicy, RetryingStore, SeriesStore},
};

fn fast(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
    }
}

fn empty() -> RowBatch {
    RowBatch::new(Arc::new(RecordSchema::ohlcv()))
}

/// Fails every query with a non-retryable error.
#[derive(Default)]
struct BrokenQueries {
    queries: AtomicUsize,
}

#[async_trait]
impl SeriesStore for BrokenQueries {
    async fn write(&self, _key: &str, _rows: &RowBatch, _variable_length: bool) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<RowBatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Err(Error::StoreQuery {
            key: request.key(),
            message: "corrupt page".to_string(),
        })
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    async fn server_version(&self) -> Result<String> {
        Ok("broken".to_string())
    }
}

#[tokio::test]
async fn transient_write_failures_are_retried() {
    let inner = MemoryStore::new();
    inner.fail_next_writes(2);
    let store = RetryingStore::new(inner, fast(3));

    store.write("SPY/1D/OHLCV", &empty(), false).await.unwrap();
    assert_eq!(store.inner().calls().writes, 3);
}

#[tokio::test]
async fn retries_stop_at_the_limit() {
    let inner = MemoryStore::new();
    inner.fail_writes_for("SPY/1D/OHLCV");
    let store = RetryingStore::new(inner, fast(2));

    let err = store.write("SPY/1D/OHLCV", &empty(), false).await.unwrap_err();
    assert!(matches!(err, Error::StoreWrite { .. }));
    assert_eq!(store.inner().calls().writes, 3);
}

#[tokio::test]
async fn unreachable_store_is_retried_then_reported() {
    let inner = MemoryStore::new();
    inner.set_unreachable(true);
    let store = RetryingStore::new(inner, fast(1));

    let err = store.list_symbols().await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(store.inner().calls().list_symbols, 2);
}

#[tokio::test]
async fn non_retryable_errors_fail_immediately() {
    let store = RetryingStore::new(BrokenQueries::default(), fast(5));
    let key = SeriesKey::resolve("SPY", "1D").unwrap();

    let err = store.query(&QueryRequest::all(&key)).await.unwrap_err();
    assert!(matches!(err, Error::StoreQuery { .. }));
    assert_eq!(store.inner().queries.load(Ordering::SeqCst), 1);
}

#[test]
fn backoff_doubles_and_caps_at_a_minute() {
    let policy = RetryPolicy {
        max_retries: 10,
        base_delay: Duration::from_secs(1),
    };
    assert_eq!(policy.delay(0), Duration::from_secs(1));
    assert_eq!(policy.delay(3), Duration::from_secs(8));
    assert_eq!(policy.delay(9), Duration::from_secs(60));
}
