//! Streamed bar record, as pushed by the market-data websocket.
//!
//! Field names follow the wire format (`S`, `t`, `o`, ...). Unknown fields such as
//! the message type tag `T` are ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::bar_frame::Cell;

/// One minute-bar update for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBar {
    /// Symbol the bar belongs to.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bar start time (UTC).
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

    /// Volume-weighted average price. Not every feed sends it.
    #[serde(rename = "vw", default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,

    /// Trade count. Not every feed sends it.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<u64>,
}

impl StreamBar {
    /// The value fields as `(wire name, cell)` pairs.
    ///
    /// Trade counts beyond `i64::MAX` cannot occur in practice and are reported as
    /// null rather than wrapped.
    pub fn cells(&self) -> [(&'static str, Cell); 7] {
        [
            ("o", Cell::Float(self.open)),
            ("h", Cell::Float(self.high)),
            ("l", Cell::Float(self.low)),
            ("c", Cell::Float(self.close)),
            ("v", Cell::Float(self.volume)),
            ("vw", Cell::from(self.vwap)),
            (
                "n",
                Cell::from(self.trade_count.and_then(|n| i64::try_from(n).ok())),
            ),
        ]
    }
}
