//! Ingestion writer: normalize, key, and write under the series lock.

use std::sync::Arc;

use market_data_ingestor::models::{bar::StreamBar, bar_frame::BarFrame};
use tracing::debug;

use crate::{
    error::{Error, Result},
    key::{DEFAULT_ATTRIBUTE_GROUP, SeriesKey},
    locks::KeyLocks,
    normalize::BarNormalizer,
    record::RowBatch,
    store::SharedStore,
};

pub const DEFAULT_STREAM_TIMEFRAME: &str = "1Min";

/// Outcome of one successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub key: String,
    pub rows_written: usize,
}

pub struct IngestionWriter {
    store: SharedStore,
    locks: Arc<KeyLocks>,
    normalizer: BarNormalizer,
    stream_timeframe: String,
    attribute_group: String,
}

impl IngestionWriter {
    pub fn new(store: SharedStore, locks: Arc<KeyLocks>, normalizer: BarNormalizer) -> Self {
        Self {
            store,
            locks,
            normalizer,
            stream_timeframe: DEFAULT_STREAM_TIMEFRAME.to_string(),
            attribute_group: DEFAULT_ATTRIBUTE_GROUP.to_string(),
        }
    }

    /// Timeframe that streamed bars are filed under. Validated up front.
    pub fn with_stream_timeframe(mut self, timeframe: &str) -> Result<Self> {
        crate::key::resolve_timeframe(timeframe)?;
        self.stream_timeframe = timeframe.to_string();
        Ok(self)
    }

    pub fn with_attribute_group(mut self, group: impl Into<String>) -> Self {
        self.attribute_group = group.into();
        self
    }

    pub fn normalizer(&self) -> &BarNormalizer {
        &self.normalizer
    }

    /// Writes one streamed bar to `{bar.symbol}/{stream timeframe}/{group}`.
    pub async fn write_stream(&self, bar: &StreamBar) -> Result<WriteResult> {
        let key = SeriesKey::resolve_in(&bar.symbol, &self.stream_timeframe, &self.attribute_group)?;
        let values = self
            .normalizer
            .normalize_stream(bar)
            .map_err(|source| Error::RowRejected {
                key: key.to_string(),
                row: 0,
                source: Box::new(source),
            })?;

        let mut rows = RowBatch::with_capacity(Arc::clone(self.normalizer.schema()), 1);
        rows.push(&values)?;
        self.write_rows(&key, rows).await
    }

    /// Normalizes all of `frame` and writes it in one store call.
    ///
    /// Any row failure aborts before the store is touched.
    pub async fn write_batch(
        &self,
        symbol: &str,
        timeframe: &str,
        frame: &BarFrame,
    ) -> Result<WriteResult> {
        let key = SeriesKey::resolve_in(symbol, timeframe, &self.attribute_group)?;
        let rows = self
            .normalizer
            .normalize_frame(frame)
            .map_err(|rejected| Error::RowRejected {
                key: key.to_string(),
                row: rejected.row,
                source: Box::new(rejected.source),
            })?;
        self.write_rows(&key, rows).await
    }

    /// Writes already-packed records. An empty batch is not sent to the store.
    pub async fn write_rows(&self, key: &SeriesKey, rows: RowBatch) -> Result<WriteResult> {
        let key = key.to_string();
        if rows.is_empty() {
            debug!(%key, "empty batch, nothing to write");
            return Ok(WriteResult {
                key,
                rows_written: 0,
            });
        }

        let _guard = self.locks.lock(&key).await;
        self.store.write(&key, &rows, false).await?;
        debug!(%key, rows = rows.len(), "wrote rows");
        Ok(WriteResult {
            rows_written: rows.len(),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use market_data_ingestor::models::bar_frame::Cell;

    use super::*;
    use crate::{record::RecordSchema, store::MemoryStore};

    fn writer(store: Arc<MemoryStore>) -> IngestionWriter {
        IngestionWriter::new(
            store,
            Arc::new(KeyLocks::new()),
            BarNormalizer::new(Arc::new(RecordSchema::ohlcv())),
        )
    }

    #[tokio::test]
    async fn stream_bars_use_embedded_symbol_and_stream_timeframe() {
        let store = MemoryStore::shared();
        let bar: StreamBar = serde_json::from_str(
            r#"{"S":"SPY","t":"2024-01-02T14:30:00Z","o":1,"h":2,"l":0.5,"c":1.5,"v":10,"vw":1.2}"#,
        )
        .unwrap();

        let res = writer(Arc::clone(&store)).write_stream(&bar).await.unwrap();
        assert_eq!(
            res,
            WriteResult {
                key: "SPY/1Min/OHLCV".into(),
                rows_written: 1
            }
        );
        assert_eq!(store.keys(), vec!["SPY/1Min/OHLCV"]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_store() {
        let store = MemoryStore::shared();
        let frame = BarFrame::indexed(["open", "high", "low", "close", "volume", "vwap"]);

        let res = writer(Arc::clone(&store))
            .write_batch("SPY", "1D", &frame)
            .await
            .unwrap();
        assert_eq!(res.rows_written, 0);
        assert_eq!(store.calls().writes, 0);
    }

    #[tokio::test]
    async fn invalid_timeframe_fails_before_normalizing() {
        let store = MemoryStore::shared();
        let mut frame = BarFrame::indexed(["open"]);
        frame
            .push_indexed_row(Utc.timestamp_opt(0, 0).unwrap(), vec![Cell::Float(1.0)])
            .unwrap();

        let err = writer(Arc::clone(&store))
            .write_batch("SPY", "5X", &frame)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTimeframe { .. }));
        assert_eq!(store.calls().writes, 0);
    }

    #[test]
    fn stream_timeframe_is_validated() {
        let w = writer(MemoryStore::shared());
        assert!(w.with_stream_timeframe("5Min").is_ok());
        let w = writer(MemoryStore::shared());
        assert!(w.with_stream_timeframe("week").is_err());
    }
}
