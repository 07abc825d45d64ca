use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::timeframe::TimeFrame;

/// Corporate action adjustment applied to historical bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    #[default]
    Raw,
    Split,
    Dividend,
    All,
}

impl Adjustment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::Split => "split",
            Adjustment::Dividend => "dividend",
            Adjustment::All => "all",
        }
    }
}

/// Parameters for one page of historical bars for a single symbol.
///
/// Providers return bars at or after `start`, oldest first, at most `limit` rows.
#[derive(Clone, Debug, PartialEq)]
pub struct BarsRequest {
    /// Symbol to request (e.g., `"AAPL"`).
    pub symbol: String,

    /// Interval of each bar. Each provider validates the combinations it accepts.
    pub timeframe: TimeFrame,

    /// Start of the requested range (inclusive, UTC).
    pub start: DateTime<Utc>,

    /// End of the requested range (exclusive, UTC). `None` means "up to now".
    pub end: Option<DateTime<Utc>>,

    /// Page size.
    pub limit: u32,

    pub adjustment: Adjustment,
}
