//! Trade (fill) model delivered to strategies by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Direction, Offset, OrderId};

/// Fill report for one of the strategy's orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeData {
    /// Unique trade identifier assigned by the engine
    pub vt_tradeid: String,

    /// Order this fill belongs to
    pub vt_orderid: OrderId,

    /// Instrument identifier (`symbol.exchange`)
    pub vt_symbol: String,

    /// Long or short side of the fill
    pub direction: Direction,

    /// Whether the fill opened or closed exposure
    #[serde(default)]
    pub offset: Offset,

    /// Fill price
    pub price: Decimal,

    /// Filled quantity (always positive)
    pub volume: Decimal,

    /// When the fill happened
    #[serde(default = "Utc::now")]
    pub datetime: DateTime<Utc>,
}

impl TradeData {
    /// Signed change this fill applies to a net position.
    pub fn position_change(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.volume,
            Direction::Short => -self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_trade(direction: Direction, offset: Offset) -> TradeData {
        TradeData {
            vt_tradeid: "T1".to_string(),
            vt_orderid: OrderId::from("O1"),
            vt_symbol: "IF2401.CFFEX".to_string(),
            direction,
            offset,
            price: dec!(3500.2),
            volume: dec!(2),
            datetime: Utc::now(),
        }
    }

    #[test]
    fn test_position_change_sign() {
        assert_eq!(make_trade(Direction::Long, Offset::Open).position_change(), dec!(2));
        assert_eq!(make_trade(Direction::Long, Offset::Close).position_change(), dec!(2));
        assert_eq!(make_trade(Direction::Short, Offset::Open).position_change(), dec!(-2));
        assert_eq!(make_trade(Direction::Short, Offset::Close).position_change(), dec!(-2));
    }
}
