#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use market_data_ingestor::{
    models::{
        bar_frame::{BarFrame, Cell},
        request_params::BarsRequest,
    },
    providers::{ApiSnafu, BarPage, DataProvider, ProviderError},
};
use ohlcv_sync::{
    locks::KeyLocks,
    normalize::BarNormalizer,
    record::RecordSchema,
    store::{SharedStore, SqliteStore},
    writer::IngestionWriter,
};
use tempfile::TempDir;

pub const COLUMNS: [&str; 7] = ["open", "high", "low", "close", "volume", "trade_count", "vwap"];

pub fn at(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).unwrap()
}

/// One complete provider-shaped row with every price set to `price`.
pub fn row(price: f64) -> Vec<Cell> {
    vec![
        Cell::Float(price),
        Cell::Float(price + 1.0),
        Cell::Float(price - 1.0),
        Cell::Float(price + 0.5),
        Cell::Int(1_000),
        Cell::Int(42),
        Cell::Float(price + 0.25),
    ]
}

/// An indexed frame with one row per epoch, priced 10.0, 11.0, ...
pub fn frame(epochs: &[i64]) -> BarFrame {
    let mut f = BarFrame::indexed(COLUMNS);
    for (i, &e) in epochs.iter().enumerate() {
        f.push_indexed_row(at(e), row(10.0 + i as f64)).unwrap();
    }
    f
}

pub fn writer(store: SharedStore) -> IngestionWriter {
    IngestionWriter::new(
        store,
        Arc::new(KeyLocks::new()),
        BarNormalizer::new(Arc::new(RecordSchema::ohlcv())),
    )
}

/// A fresh on-disk SQLite store. Keep the dir alive for the test's duration.
pub fn sqlite_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ohlcv.db");
    let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
    (dir, store)
}

/// Serves canned frames by symbol and records each request.
#[derive(Default)]
pub struct FakeProvider {
    frames: HashMap<String, BarFrame>,
    more: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    requests: Mutex<Vec<BarsRequest>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, frame: BarFrame) -> Self {
        self.frames.insert(symbol.to_string(), frame);
        self
    }

    /// Marks `symbol`'s page as having a continuation.
    pub fn with_more(mut self, symbol: &str) -> Self {
        self.more.insert(symbol.to_string(), format!("{symbol}-page-2"));
        self
    }

    /// Answers `symbol` with an API error of the given status.
    pub fn with_status(mut self, symbol: &str, status: u16) -> Self {
        self.statuses.insert(symbol.to_string(), status);
        self
    }

    pub fn requests(&self) -> Vec<BarsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataProvider for FakeProvider {
    async fn get_bars(&self, request: BarsRequest) -> Result<BarPage, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(&status) = self.statuses.get(&request.symbol) {
            return ApiSnafu {
                status,
                message: "unavailable",
            }
            .fail();
        }
        let Some(frame) = self.frames.get(&request.symbol) else {
            return ApiSnafu {
                status: 404u16,
                message: format!("unknown symbol {}", request.symbol),
            }
            .fail();
        };
        Ok(BarPage {
            frame: frame.clone(),
            next_page_token: self.more.get(&request.symbol).cloned(),
        })
    }
}
