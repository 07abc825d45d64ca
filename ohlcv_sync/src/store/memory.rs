//! In-process store. Backs `backend = "memory"` and doubles as the test store,
//! with call counters and fault injection.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    key::SeriesKey,
    record::RowBatch,
    store::{QueryRequest, SeriesStore, last_per_epoch},
};

pub const VERSION: &str = concat!("memory-", env!("CARGO_PKG_VERSION"));

/// Snapshot of how often each store operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub writes: usize,
    pub destroys: usize,
    pub queries: usize,
    pub list_symbols: usize,
}

#[derive(Debug, Default)]
struct Counters {
    writes: AtomicUsize,
    destroys: AtomicUsize,
    queries: AtomicUsize,
    list_symbols: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    transient_writes: usize,
    failing_write_keys: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    series: Mutex<BTreeMap<String, RowBatch>>,
    counters: Counters,
    faults: Mutex<Faults>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking test thread must not wedge the others
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            writes: self.counters.writes.load(Ordering::SeqCst),
            destroys: self.counters.destroys.load(Ordering::SeqCst),
            queries: self.counters.queries.load(Ordering::SeqCst),
            list_symbols: self.counters.list_symbols.load(Ordering::SeqCst),
        }
    }

    /// Every operation fails with [`Error::Connection`] while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.faults).unreachable = unreachable;
    }

    /// The next `n` writes fail with a retryable [`Error::StoreWrite`].
    pub fn fail_next_writes(&self, n: usize) {
        lock(&self.faults).transient_writes = n;
    }

    /// Every write to `key` fails until cleared.
    pub fn fail_writes_for(&self, key: &str) {
        lock(&self.faults).failing_write_keys.insert(key.to_string());
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.series).keys().cloned().collect()
    }

    fn check_reachable(&self) -> Result<()> {
        if lock(&self.faults).unreachable {
            return Err(Error::Connection {
                message: "memory store marked unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> Result<()> {
        let mut faults = lock(&self.faults);
        if faults.failing_write_keys.contains(key) || faults.transient_writes > 0 {
            faults.transient_writes = faults.transient_writes.saturating_sub(1);
            return Err(Error::StoreWrite {
                key: key.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn write(&self, key: &str, rows: &RowBatch, variable_length: bool) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        self.check_write(key)?;

        let mut series = lock(&self.series);
        if !series.contains_key(key) {
            let mut fresh = RowBatch::new(rows.schema().clone());
            let keep: Vec<usize> = if variable_length {
                (0..rows.len()).collect()
            } else {
                last_per_epoch(rows)
            };
            for i in keep {
                fresh.push_raw(rows.record(i));
            }
            series.insert(key.to_string(), sorted(&fresh));
            return Ok(());
        }
        let existing = &series[key];

        if !existing.schema().same_layout(rows.schema()) {
            return Err(Error::StoreWrite {
                key: key.to_string(),
                message: format!(
                    "layout {} does not match stored {}",
                    rows.schema().descriptor(),
                    existing.schema().descriptor()
                ),
            });
        }

        let mut merged = RowBatch::new(existing.schema().clone());
        if variable_length {
            merged.extend(existing)?;
            merged.extend(rows)?;
        } else {
            let keep = last_per_epoch(rows);
            let incoming: HashSet<i64> = keep.iter().map(|&i| rows.epoch(i)).collect();
            for i in 0..existing.len() {
                if !incoming.contains(&existing.epoch(i)) {
                    merged.push_raw(existing.record(i));
                }
            }
            for i in keep {
                merged.push_raw(rows.record(i));
            }
        }
        series.insert(key.to_string(), sorted(&merged));
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        self.counters.destroys.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        lock(&self.series).remove(key);
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<RowBatch>> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(lock(&self.series)
            .get(&request.key())
            .map(|batch| batch.filter_epochs(|e| request.contains(e))))
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>> {
        self.counters.list_symbols.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(lock(&self.series)
            .keys()
            .filter_map(|k| SeriesKey::parse(k).ok())
            .map(|k| k.symbol)
            .collect())
    }

    async fn server_version(&self) -> Result<String> {
        self.check_reachable()?;
        Ok(VERSION.to_string())
    }
}

/// Stable sort by epoch.
fn sorted(batch: &RowBatch) -> RowBatch {
    let mut order: Vec<usize> = (0..batch.len()).collect();
    order.sort_by_key(|&i| batch.epoch(i));
    let mut out = RowBatch::with_capacity(batch.schema().clone(), batch.len());
    for i in order {
        out.push_raw(batch.record(i));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordSchema, Value};

    fn batch(rows: &[(i64, f32)]) -> RowBatch {
        let mut b = RowBatch::new(Arc::new(RecordSchema::ohlcv()));
        for &(e, c) in rows {
            b.push(&[
                Value::I64(e),
                Value::F32(c),
                Value::F32(c),
                Value::F32(c),
                Value::F32(c),
                Value::I32(1),
                Value::F32(c),
            ])
            .unwrap();
        }
        b
    }

    fn closes(b: &RowBatch) -> Vec<(i64, f32)> {
        (0..b.len())
            .map(|i| match b.values(i)[4] {
                Value::F32(c) => (b.epoch(i), c),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    fn all(key: &str) -> QueryRequest {
        QueryRequest::all(&SeriesKey::parse(key).unwrap())
    }

    #[tokio::test]
    async fn fixed_length_writes_replace_duplicate_epochs() {
        let store = MemoryStore::new();
        store.write("A/1D/OHLCV", &batch(&[(100, 1.0), (200, 2.0)]), false).await.unwrap();
        store.write("A/1D/OHLCV", &batch(&[(200, 9.0), (300, 3.0)]), false).await.unwrap();

        let got = store.query(&all("A/1D/OHLCV")).await.unwrap().unwrap();
        assert_eq!(closes(&got), vec![(100, 1.0), (200, 9.0), (300, 3.0)]);
    }

    #[tokio::test]
    async fn variable_length_writes_append() {
        let store = MemoryStore::new();
        store.write("A/1D/OHLCV", &batch(&[(100, 1.0)]), true).await.unwrap();
        store.write("A/1D/OHLCV", &batch(&[(100, 2.0)]), true).await.unwrap();

        let got = store.query(&all("A/1D/OHLCV")).await.unwrap().unwrap();
        assert_eq!(closes(&got), vec![(100, 1.0), (100, 2.0)]);
    }

    #[tokio::test]
    async fn layout_drift_is_rejected() {
        let store = MemoryStore::new();
        store.write("A/1D/OHLCV", &batch(&[(1, 1.0)]), false).await.unwrap();
        let other = RowBatch::new(Arc::new(RecordSchema::ohlcv_extended()));
        let err = store.write("A/1D/OHLCV", &other, false).await.unwrap_err();
        assert!(matches!(err, Error::StoreWrite { .. }));
    }

    #[tokio::test]
    async fn lists_symbols_across_timeframes() {
        let store = MemoryStore::new();
        store.write("A/1D/OHLCV", &batch(&[(1, 1.0)]), false).await.unwrap();
        store.write("A/1Min/OHLCV", &batch(&[(1, 1.0)]), false).await.unwrap();
        store.write("B/1D/OHLCV", &batch(&[(1, 1.0)]), false).await.unwrap();

        let symbols = store.list_symbols().await.unwrap();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn default_replace_reports_degraded_series() {
        let store = MemoryStore::new();
        store.write("A/1D/OHLCV", &batch(&[(1, 1.0), (2, 2.0)]), false).await.unwrap();
        store.fail_writes_for("A/1D/OHLCV");

        let err = store.replace("A/1D/OHLCV", &batch(&[(2, 2.0)])).await.unwrap_err();
        assert!(matches!(&err, Error::TrimDegraded { key, .. } if key == "A/1D/OHLCV"));
        assert!(store.query(&all("A/1D/OHLCV")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        assert!(matches!(
            store.server_version().await,
            Err(Error::Connection { .. })
        ));
        assert!(store.list_symbols().await.is_err());
        assert_eq!(store.calls().list_symbols, 1);
    }
}
