//! Series key resolution.
//!
//! A series is addressed as `{symbol}/{timeframe}/{attribute_group}`, e.g.
//! `SPY/1D/OHLCV`. Timeframe strings follow `<positive integer><unit>` where only the
//! first letter of the unit matters: `D` day, `H` hour, `M` minute
//! (case-insensitive). `15Min`, `2H`, `1day` are all accepted.

use std::{fmt, num::NonZeroU32};

use market_data_ingestor::models::timeframe::{TimeFrame, TimeFrameUnit};

use crate::error::{Error, Result};

/// Attribute group every OHLCV series is stored under.
pub const DEFAULT_ATTRIBUTE_GROUP: &str = "OHLCV";

/// Parses a timeframe string into amount and unit.
pub fn resolve_timeframe(spec: &str) -> Result<TimeFrame> {
    let invalid = |reason: &str| Error::InvalidTimeframe {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let split = spec
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(spec.len());
    let (digits, suffix) = spec.split_at(split);

    if digits.is_empty() {
        return Err(invalid("missing numeric multiplier"));
    }
    let amount: u32 = digits
        .parse()
        .map_err(|_| invalid("multiplier out of range"))?;
    let amount = NonZeroU32::new(amount).ok_or_else(|| invalid("multiplier must be positive"))?;

    let unit = match suffix.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('D') => TimeFrameUnit::Day,
        Some('H') => TimeFrameUnit::Hour,
        Some('M') => TimeFrameUnit::Minute,
        Some(_) => return Err(invalid("unit must start with D, H or M")),
        None => return Err(invalid("missing unit")),
    };

    Ok(TimeFrame::new(amount, unit))
}

/// `"{symbol}/{timeframe}/{attribute_group}"`. The symbol is not validated.
pub fn build_key(symbol: &str, timeframe: &str, attribute_group: &str) -> String {
    format!("{symbol}/{timeframe}/{attribute_group}")
}

/// Typed series identity. The timeframe keeps the caller's spelling so the key
/// matches what was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: String,
    pub attribute_group: String,
}

impl SeriesKey {
    /// Validates `timeframe` and builds a key in the default attribute group.
    pub fn resolve(symbol: &str, timeframe: &str) -> Result<Self> {
        Self::resolve_in(symbol, timeframe, DEFAULT_ATTRIBUTE_GROUP)
    }

    pub fn resolve_in(symbol: &str, timeframe: &str, attribute_group: &str) -> Result<Self> {
        resolve_timeframe(timeframe)?;
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            attribute_group: attribute_group.to_string(),
        })
    }

    /// Reverses [`build_key`]. Splits from the right so the last two segments are
    /// timeframe and group.
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.rsplitn(3, '/');
        let (Some(group), Some(timeframe), Some(symbol)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidTimeframe {
                spec: key.to_string(),
                reason: "key is not symbol/timeframe/group".to_string(),
            });
        };
        Self::resolve_in(symbol, timeframe, group)
    }

    pub fn timeframe(&self) -> Result<TimeFrame> {
        resolve_timeframe(&self.timeframe)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.timeframe, self.attribute_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tf(amount: u32, unit: TimeFrameUnit) -> TimeFrame {
        TimeFrame::new(NonZeroU32::new(amount).unwrap(), unit)
    }

    #[test]
    fn parses_supported_spellings() {
        assert_eq!(resolve_timeframe("1Min").unwrap(), tf(1, TimeFrameUnit::Minute));
        assert_eq!(resolve_timeframe("15Min").unwrap(), tf(15, TimeFrameUnit::Minute));
        assert_eq!(resolve_timeframe("2H").unwrap(), tf(2, TimeFrameUnit::Hour));
        assert_eq!(resolve_timeframe("1D").unwrap(), tf(1, TimeFrameUnit::Day));
        assert_eq!(resolve_timeframe("3hour").unwrap(), tf(3, TimeFrameUnit::Hour));
    }

    #[test]
    fn rejects_malformed_specs() {
        for spec in ["Min", "5X", "0D", "", "15", "99999999999Min", "-1D"] {
            let err = resolve_timeframe(spec).unwrap_err();
            assert!(
                matches!(&err, Error::InvalidTimeframe { spec: s, .. } if s == spec),
                "{spec:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn builds_and_parses_keys() {
        assert_eq!(build_key("SPY", "1D", DEFAULT_ATTRIBUTE_GROUP), "SPY/1D/OHLCV");

        let key = SeriesKey::resolve("SPY", "1D").unwrap();
        assert_eq!(key.to_string(), "SPY/1D/OHLCV");
        assert_eq!(SeriesKey::parse("SPY/1D/OHLCV").unwrap(), key);

        // symbols are opaque, slashes included
        let odd = SeriesKey::parse("BRK/B/1Min/OHLCV").unwrap();
        assert_eq!(odd.symbol, "BRK/B");
        assert_eq!(odd.timeframe, "1Min");
    }

    #[test]
    fn resolve_rejects_bad_timeframe() {
        assert!(SeriesKey::resolve("SPY", "1W").is_err());
        assert!(SeriesKey::parse("SPY/OHLCV").is_err());
    }
}
