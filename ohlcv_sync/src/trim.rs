//! Retention trimming.
//!
//! For every timeframe in the policy, every symbol the store knows about is
//! checked. A series longer than its limit is replaced with its most recent
//! `limit` records through [`SeriesStore::replace`]; how safe that replacement is
//! depends on the store (see [`crate::store`]).
//!
//! The first failure ends the run. A replacement that left a series destroyed is
//! logged at error level with its key before the error propagates.
//!
//! [`SeriesStore::replace`]: crate::store::SeriesStore::replace

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    error::{Error, Result},
    key::{DEFAULT_ATTRIBUTE_GROUP, SeriesKey, resolve_timeframe},
    locks::KeyLocks,
    store::{QueryRequest, SharedStore},
};

/// Maximum bar count per timeframe, applied in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionPolicy(IndexMap<String, usize>);

impl Default for RetentionPolicy {
    /// 500 bars for each of 1Min, 3Min, 5Min, 15Min, 30Min, 1H, 2H and 1D.
    fn default() -> Self {
        ["1Min", "3Min", "5Min", "15Min", "30Min", "1H", "2H", "1D"]
            .into_iter()
            .map(|tf| (tf.to_string(), 500))
            .collect()
    }
}

impl FromIterator<(String, usize)> for RetentionPolicy {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl RetentionPolicy {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with(mut self, timeframe: impl Into<String>, limit: usize) -> Self {
        self.0.insert(timeframe.into(), limit);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(tf, limit)| (tf.as_str(), *limit))
    }

    pub fn timeframes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks every timeframe against the timeframe grammar.
    pub fn validate(&self) -> Result<()> {
        self.timeframes().try_for_each(|tf| resolve_timeframe(tf).map(|_| ()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedSeries {
    pub key: String,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// (symbol, timeframe) pairs looked at.
    pub examined: usize,
    pub trimmed: Vec<TrimmedSeries>,
}

pub struct RetentionTrimmer {
    store: SharedStore,
    locks: Arc<KeyLocks>,
    attribute_group: String,
}

impl RetentionTrimmer {
    pub fn new(store: SharedStore, locks: Arc<KeyLocks>) -> Self {
        Self {
            store,
            locks,
            attribute_group: DEFAULT_ATTRIBUTE_GROUP.to_string(),
        }
    }

    pub fn with_attribute_group(mut self, group: impl Into<String>) -> Self {
        self.attribute_group = group.into();
        self
    }

    pub async fn trim(&self, policy: &RetentionPolicy) -> Result<TrimReport> {
        let mut report = TrimReport::default();

        for (timeframe, limit) in policy.iter() {
            resolve_timeframe(timeframe)?;
            let symbols = self.store.list_symbols().await?;

            for symbol in symbols {
                info!(%symbol, timeframe, limit, "trimming");
                let key = SeriesKey::resolve_in(&symbol, timeframe, &self.attribute_group)?;
                report.examined += 1;

                if let Some(trimmed) = self.trim_series(&key, limit).await.inspect_err(|e| {
                    match e {
                        Error::TrimDegraded { key, .. } => {
                            error!(%key, error = %e, "series destroyed but not rewritten");
                        }
                        _ => error!(key = %key, error = %e, "trim failed"),
                    }
                })? {
                    report.trimmed.push(trimmed);
                }
            }
        }
        Ok(report)
    }

    async fn trim_series(&self, key: &SeriesKey, limit: usize) -> Result<Option<TrimmedSeries>> {
        let key_str = key.to_string();
        let _guard = self.locks.lock(&key_str).await;

        let Some(rows) = self.store.query(&QueryRequest::all(key)).await? else {
            debug!(key = %key_str, "no series");
            return Ok(None);
        };
        let before = rows.len();
        if before <= limit {
            return Ok(None);
        }

        let tail = rows.tail(limit);
        self.store.replace(&key_str, &tail).await?;
        Ok(Some(TrimmedSeries {
            key: key_str,
            before,
            after: tail.len(),
        }))
    }
}
