//! Historical backfill.
//!
//! One feed request per (timeframe, symbol) pair, fed through the normalizer and
//! the writer. Pairs are isolated: a failure is logged, recorded in the report,
//! and the remaining pairs still run.
//!
//! Only the first page of each request is written. When the feed reports more,
//! a warning names the pair; raise `page_size` or move `start` forward.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::{StreamExt, stream};
use market_data_ingestor::{
    models::request_params::{Adjustment, BarsRequest},
    providers::DataProvider,
};
use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    key::resolve_timeframe,
    writer::{IngestionWriter, WriteResult},
};

pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSettings {
    pub page_size: u32,
    pub adjustment: Adjustment,
    /// Pairs in flight at once; 1 runs them sequentially.
    pub concurrency: usize,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            adjustment: Adjustment::Raw,
            concurrency: 1,
        }
    }
}

#[derive(Debug)]
pub struct PairReport {
    pub symbol: String,
    pub timeframe: String,
    pub outcome: Result<WriteResult>,
    /// The feed had more rows than were written.
    pub truncated: bool,
}

impl PairReport {
    /// Whether rerunning this pair could succeed: a transient feed failure
    /// (timeout, rate limit, 5xx) or an unreachable store.
    pub fn is_transient(&self) -> bool {
        match &self.outcome {
            Ok(_) => false,
            Err(Error::Feed { source, .. }) => source.is_transient(),
            Err(e) => e.is_retryable(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    /// One entry per pair, timeframe-major in request order.
    pub pairs: Vec<PairReport>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.outcome.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.outcome.is_err())
    }

    /// Failed pairs worth another run.
    pub fn transient(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.is_transient())
    }

    pub fn rows_written(&self) -> usize {
        self.succeeded()
            .filter_map(|p| p.outcome.as_ref().ok())
            .map(|w| w.rows_written)
            .sum()
    }
}

pub struct BackfillOrchestrator {
    provider: Arc<dyn DataProvider>,
    writer: Arc<IngestionWriter>,
    settings: BackfillSettings,
}

impl BackfillOrchestrator {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        writer: Arc<IngestionWriter>,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            provider,
            writer,
            settings,
        }
    }

    /// Backfills every (timeframe, symbol) pair from midnight UTC of `start`.
    pub async fn populate(
        &self,
        symbols: &[String],
        timeframes: &[String],
        start: NaiveDate,
    ) -> BackfillReport {
        let start = start.and_time(NaiveTime::MIN).and_utc();
        let pairs: Vec<(&str, &str)> = timeframes
            .iter()
            .flat_map(|tf| symbols.iter().map(move |s| (s.as_str(), tf.as_str())))
            .collect();

        let pairs = stream::iter(pairs)
            .map(|(symbol, timeframe)| self.populate_pair(symbol, timeframe, start))
            .buffered(self.settings.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        BackfillReport { pairs }
    }

    async fn populate_pair(&self, symbol: &str, timeframe: &str, start: DateTime<Utc>) -> PairReport {
        let mut truncated = false;
        let outcome = self
            .fetch_and_write(symbol, timeframe, start, &mut truncated)
            .await;

        let report = PairReport {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            outcome,
            truncated,
        };
        match &report.outcome {
            Ok(written) => info!(
                symbol,
                timeframe,
                key = %written.key,
                rows = written.rows_written,
                "backfilled"
            ),
            Err(e) => error!(
                symbol,
                timeframe,
                transient = report.is_transient(),
                error = %e,
                "backfill failed"
            ),
        }
        report
    }

    async fn fetch_and_write(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        truncated: &mut bool,
    ) -> Result<WriteResult> {
        let request = BarsRequest {
            symbol: symbol.to_string(),
            timeframe: resolve_timeframe(timeframe)?,
            start,
            end: None,
            limit: self.settings.page_size,
            adjustment: self.settings.adjustment,
        };

        let page = self
            .provider
            .get_bars(request)
            .await
            .map_err(|source| Error::Feed {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                source,
            })?;

        if page.next_page_token.is_some() {
            *truncated = true;
            warn!(
                symbol,
                timeframe,
                rows = page.frame.len(),
                "feed has more pages; only the first is written"
            );
        }

        self.writer.write_batch(symbol, timeframe, &page.frame).await
    }
}
