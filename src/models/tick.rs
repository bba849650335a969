//! Level-1 tick snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best-quote snapshot for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickData {
    /// Instrument identifier (`symbol.exchange`)
    pub vt_symbol: String,

    pub datetime: DateTime<Utc>,

    #[serde(default)]
    pub last_price: Decimal,

    /// Cumulative traded volume for the session
    #[serde(default)]
    pub volume: Decimal,

    #[serde(default)]
    pub open_interest: Decimal,

    pub bid_price_1: Decimal,

    #[serde(default)]
    pub bid_volume_1: Decimal,

    pub ask_price_1: Decimal,

    #[serde(default)]
    pub ask_volume_1: Decimal,

    /// Session up-limit price; absent or zero when the venue has none
    #[serde(default)]
    pub limit_up: Option<Decimal>,

    /// Session down-limit price; absent or zero when the venue has none
    #[serde(default)]
    pub limit_down: Option<Decimal>,
}

impl TickData {
    /// Up-limit price if one is in effect.
    pub fn active_limit_up(&self) -> Option<Decimal> {
        self.limit_up.filter(|p| !p.is_zero())
    }

    /// Down-limit price if one is in effect.
    pub fn active_limit_down(&self) -> Option<Decimal> {
        self.limit_down.filter(|p| !p.is_zero())
    }
}
