//! Bar interval model shared by feed requests and series keys.

use std::{fmt, num::NonZeroU32};

/// Granularity of a bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrameUnit {
    Minute,
    Hour,
    Day,
}

/// A timeframe = amount × unit (e.g., 5-Minute, 2-Hour, 1-Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeFrame {
    pub amount: NonZeroU32,
    pub unit: TimeFrameUnit,
}

impl TimeFrame {
    pub const fn new(amount: NonZeroU32, unit: TimeFrameUnit) -> Self {
        Self { amount, unit }
    }

    /// `amount` minutes, or `None` for zero.
    pub fn minutes(amount: u32) -> Option<Self> {
        NonZeroU32::new(amount).map(|a| Self::new(a, TimeFrameUnit::Minute))
    }

    /// `amount` hours, or `None` for zero.
    pub fn hours(amount: u32) -> Option<Self> {
        NonZeroU32::new(amount).map(|a| Self::new(a, TimeFrameUnit::Hour))
    }

    /// `amount` days, or `None` for zero.
    pub fn days(amount: u32) -> Option<Self> {
        NonZeroU32::new(amount).map(|a| Self::new(a, TimeFrameUnit::Day))
    }
}

/// Renders the Alpaca data API spelling: `15Min`, `2Hour`, `1Day`.
impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeFrameUnit::Minute => "Min",
            TimeFrameUnit::Hour => "Hour",
            TimeFrameUnit::Day => "Day",
        };
        write!(f, "{}{}", self.amount, unit)
    }
}
