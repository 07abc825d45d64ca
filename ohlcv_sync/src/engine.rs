//! One store, one lock table, and every component wired over them.

use std::sync::Arc;

use market_data_ingestor::{
    models::{bar::StreamBar, bar_frame::BarFrame},
    providers::DataProvider,
};
use tracing::{info, warn};

use crate::{
    backfill::{BackfillOrchestrator, BackfillSettings},
    bar::Bar,
    config::{AppConfig, Backend, ConfigError},
    error::Result,
    key::{DEFAULT_ATTRIBUTE_GROUP, SeriesKey},
    locks::KeyLocks,
    normalize::BarNormalizer,
    query::SeriesQuery,
    record::RecordSchema,
    store::{MemoryStore, RetryingStore, SharedStore, SqliteStore},
    trim::{RetentionPolicy, RetentionTrimmer, TrimReport},
    writer::{DEFAULT_STREAM_TIMEFRAME, IngestionWriter, WriteResult},
};

pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub schema: Arc<RecordSchema>,
    pub stream_timeframe: String,
    pub attribute_group: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schema: Arc::new(RecordSchema::ohlcv()),
            stream_timeframe: DEFAULT_STREAM_TIMEFRAME.to_string(),
            attribute_group: DEFAULT_ATTRIBUTE_GROUP.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            schema: Arc::new(config.record_schema()?),
            stream_timeframe: config.ingest.stream_timeframe.clone(),
            attribute_group: config.ingest.attribute_group.clone(),
        })
    }
}

/// Opens the configured backend behind the retry layer.
pub fn open_store(config: &AppConfig) -> Result<SharedStore> {
    let policy = config.retry.policy();
    Ok(match config.store.backend {
        Backend::Sqlite => Arc::new(RetryingStore::new(
            SqliteStore::open(&config.store.database_url)?,
            policy,
        )),
        Backend::Memory => Arc::new(RetryingStore::new(MemoryStore::new(), policy)),
    })
}

pub struct SeriesEngine {
    store: SharedStore,
    locks: Arc<KeyLocks>,
    writer: Arc<IngestionWriter>,
    trimmer: RetentionTrimmer,
    query: SeriesQuery,
    settings: EngineSettings,
    server_version: String,
}

impl SeriesEngine {
    /// Builds the engine and records the store's version.
    ///
    /// An unreachable store is not fatal here: the version becomes
    /// [`UNKNOWN_VERSION`] and later calls report their own errors.
    pub async fn connect(store: SharedStore, settings: EngineSettings) -> Result<Self> {
        Bar::check_schema(&settings.schema)?;
        let server_version = match store.server_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "store version lookup failed; continuing");
                UNKNOWN_VERSION.to_string()
            }
        };
        info!(server_version = %server_version, "engine ready");

        let locks = Arc::new(KeyLocks::new());
        let writer = IngestionWriter::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            BarNormalizer::new(Arc::clone(&settings.schema)),
        )
        .with_stream_timeframe(&settings.stream_timeframe)?
        .with_attribute_group(settings.attribute_group.clone());
        let trimmer = RetentionTrimmer::new(Arc::clone(&store), Arc::clone(&locks))
            .with_attribute_group(settings.attribute_group.clone());
        let query = SeriesQuery::new(Arc::clone(&store))
            .with_attribute_group(settings.attribute_group.clone());

        Ok(Self {
            store,
            locks,
            writer: Arc::new(writer),
            trimmer,
            query,
            settings,
            server_version,
        })
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn writer(&self) -> &Arc<IngestionWriter> {
        &self.writer
    }

    pub async fn write_stream(&self, bar: &StreamBar) -> Result<WriteResult> {
        self.writer.write_stream(bar).await
    }

    pub async fn write_batch(
        &self,
        symbol: &str,
        timeframe: &str,
        frame: &BarFrame,
    ) -> Result<WriteResult> {
        self.writer.write_batch(symbol, timeframe, frame).await
    }

    pub async fn trim(&self, policy: &RetentionPolicy) -> Result<TrimReport> {
        self.trimmer.trim(policy).await
    }

    pub async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Bar>> {
        self.query.query(symbol, timeframe, start, end).await
    }

    /// A backfill orchestrator writing through this engine.
    pub fn backfill(
        &self,
        provider: Arc<dyn DataProvider>,
        settings: BackfillSettings,
    ) -> BackfillOrchestrator {
        BackfillOrchestrator::new(provider, Arc::clone(&self.writer), settings)
    }

    /// Destroys every known symbol's series in each of `timeframes`.
    ///
    /// Returns the keys that were destroyed.
    pub async fn clear(&self, timeframes: &[String]) -> Result<Vec<String>> {
        let symbols = self.store.list_symbols().await?;
        let mut cleared = Vec::new();
        for timeframe in timeframes {
            for symbol in &symbols {
                let key = SeriesKey::resolve_in(symbol, timeframe, &self.settings.attribute_group)?
                    .to_string();
                let _guard = self.locks.lock(&key).await;
                self.store.destroy(&key).await?;
                info!(%key, "cleared");
                cleared.push(key);
            }
        }
        Ok(cleared)
    }
}
