use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    models::bar_frame::{BarFrame, Cell},
    providers::{BarPage, InternalSnafu, ProviderError},
};

/// Column names of frames built from Alpaca bars.
pub const COLUMNS: [&str; 7] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trade_count",
    "vwap",
];

#[derive(Deserialize, Debug)]
pub struct AlpacaBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "n", default)]
    pub trade_count: Option<i64>,
    #[serde(rename = "vw", default)]
    pub vwap: Option<f64>,
}

/// Body of `GET /v2/stocks/{symbol}/bars`.
///
/// `bars` is `null` when the range holds no data.
#[derive(Deserialize, Debug)]
pub struct AlpacaBarsResponse {
    #[serde(default)]
    pub bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl AlpacaBarsResponse {
    /// Converts the response into a timestamp-indexed frame.
    pub fn into_page(self) -> Result<BarPage, ProviderError> {
        let mut frame = BarFrame::indexed(COLUMNS);
        for bar in self.bars.unwrap_or_default() {
            let cells = vec![
                Cell::Float(bar.open),
                Cell::Float(bar.high),
                Cell::Float(bar.low),
                Cell::Float(bar.close),
                Cell::Float(bar.volume),
                Cell::from(bar.trade_count),
                Cell::from(bar.vwap),
            ];
            frame
                .push_indexed_row(bar.timestamp, cells)
                .map_err(|e| {
                    InternalSnafu {
                        message: e.to_string(),
                    }
                    .build()
                })?;
        }
        Ok(BarPage {
            frame,
            next_page_token: self.next_page_token,
        })
    }
}
