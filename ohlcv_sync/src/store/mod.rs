//! Store client interface and its implementations.
//!
//! A store holds packed records per series key. Both bundled stores return a
//! series ordered by epoch, ties in write order. The store does not interpret
//! records beyond the leading `Epoch` field.
//!
//! Writes come in two flavours:
//! - fixed length (`variable_length = false`): an incoming record replaces any
//!   stored record with the same epoch;
//! - variable length (`variable_length = true`): records are appended verbatim.

pub mod memory;
pub mod retry;
pub mod sqlite;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    key::SeriesKey,
    record::RowBatch,
};

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use sqlite::SqliteStore;

/// Store handle shared by every component of an engine.
pub type SharedStore = Arc<dyn SeriesStore>;

/// Range read of one series. Bounds are inclusive epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub symbol: String,
    pub timeframe: String,
    pub attribute_group: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl QueryRequest {
    /// The whole series.
    pub fn all(key: &SeriesKey) -> Self {
        Self {
            symbol: key.symbol.clone(),
            timeframe: key.timeframe.clone(),
            attribute_group: key.attribute_group.clone(),
            start: None,
            end: None,
        }
    }

    pub fn between(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn key(&self) -> String {
        crate::key::build_key(&self.symbol, &self.timeframe, &self.attribute_group)
    }

    pub(crate) fn contains(&self, epoch: i64) -> bool {
        self.start.is_none_or(|s| epoch >= s) && self.end.is_none_or(|e| epoch <= e)
    }
}

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Writes `rows` to `key`, creating the series if needed.
    async fn write(&self, key: &str, rows: &RowBatch, variable_length: bool) -> Result<()>;

    /// Removes the series. Destroying a missing series is not an error.
    async fn destroy(&self, key: &str) -> Result<()>;

    /// Reads a series. `None` when the key was never written or was destroyed.
    async fn query(&self, request: &QueryRequest) -> Result<Option<RowBatch>>;

    /// Every symbol with at least one series, in any timeframe.
    async fn list_symbols(&self) -> Result<BTreeSet<String>>;

    async fn server_version(&self) -> Result<String>;

    /// Replaces the whole series with `rows`.
    ///
    /// The default destroys and then writes (variable length). The two steps are
    /// separate calls: if the write fails the series is left destroyed, reported
    /// as [`Error::TrimDegraded`].
    async fn replace(&self, key: &str, rows: &RowBatch) -> Result<()> {
        self.destroy(key).await?;
        self.write(key, rows, true)
            .await
            .map_err(|source| Error::TrimDegraded {
                key: key.to_string(),
                source: Box::new(source),
            })
    }
}

/// Indices of `rows` to keep for a fixed-length write: the last record per epoch,
/// in original order.
pub(crate) fn last_per_epoch(rows: &RowBatch) -> Vec<usize> {
    let mut seen = std::collections::HashSet::new();
    let mut keep: Vec<usize> = (0..rows.len())
        .rev()
        .filter(|&i| seen.insert(rows.epoch(i)))
        .collect();
    keep.reverse();
    keep
}
