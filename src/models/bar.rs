//! OHLCV bar model.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bar interval requested from historical data loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1m")]
    Minute,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "d")]
    Daily,
    #[serde(rename = "w")]
    Weekly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "1m",
            Interval::Hour => "1h",
            Interval::Daily => "d",
            Interval::Weekly => "w",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated bar. Carries no limit-price information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarData {
    /// Instrument identifier (`symbol.exchange`)
    pub vt_symbol: String,

    /// Bar open time
    pub datetime: DateTime<Utc>,

    #[serde(default)]
    pub interval: Interval,

    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,

    #[serde(default)]
    pub volume: Decimal,

    #[serde(default)]
    pub open_interest: Decimal,
}
