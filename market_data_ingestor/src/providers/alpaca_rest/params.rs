use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::{
    models::{
        request_params::BarsRequest,
        timeframe::{TimeFrame, TimeFrameUnit},
    },
    providers::{ProviderError, ValidationSnafu},
};

/// Largest page the bars endpoint will return.
pub const MAX_LIMIT: u32 = 10_000;

/// Specifies the source feed for stock data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    #[default]
    Iex,
    Sip,
    Otc,
}

impl Feed {
    pub const fn as_str(self) -> &'static str {
        match self {
            Feed::Iex => "iex",
            Feed::Sip => "sip",
            Feed::Otc => "otc",
        }
    }
}

/// Checks the timeframe against what the bars endpoint accepts.
///
/// Minutes: 1-59, hours: 1-23, days: only 1.
pub fn validate_timeframe(tf: &TimeFrame) -> Result<(), ProviderError> {
    let amount = tf.amount.get();
    let ok = match tf.unit {
        TimeFrameUnit::Minute => amount <= 59,
        TimeFrameUnit::Hour => amount <= 23,
        TimeFrameUnit::Day => amount == 1,
    };
    if ok {
        Ok(())
    } else {
        ValidationSnafu {
            message: format!("timeframe {tf} is not supported by Alpaca"),
        }
        .fail()
    }
}

/// Builds the query string for one page of a single-symbol bars request.
pub fn construct_params(
    request: &BarsRequest,
    feed: Feed,
    page_token: Option<&str>,
) -> Result<Vec<(&'static str, String)>, ProviderError> {
    if request.limit == 0 || request.limit > MAX_LIMIT {
        return ValidationSnafu {
            message: format!("limit must be within 1..={MAX_LIMIT}, got {}", request.limit),
        }
        .fail();
    }

    let mut query = vec![
        ("timeframe", request.timeframe.to_string()),
        (
            "start",
            request.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("limit", request.limit.to_string()),
        ("adjustment", request.adjustment.as_str().to_string()),
        ("feed", feed.as_str().to_string()),
        ("sort", "asc".to_string()),
    ];
    if let Some(end) = request.end {
        query.push(("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(token) = page_token {
        query.push(("page_token", token.to_string()));
    }
    Ok(query)
}
