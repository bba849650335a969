//! Order model: identifiers, order types, directions and status updates.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Side of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

/// Whether an order opens new exposure or closes existing exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Offset {
    #[default]
    None,
    Open,
    Close,
}

/// The four strategy-level order intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CtaOrderType {
    /// Open (or add to) a long position
    Buy,
    /// Close a long position
    Sell,
    /// Open (or add to) a short position
    Short,
    /// Close a short position
    Cover,
}

impl CtaOrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CtaOrderType::Buy => "BUY",
            CtaOrderType::Sell => "SELL",
            CtaOrderType::Short => "SHORT",
            CtaOrderType::Cover => "COVER",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            CtaOrderType::Buy | CtaOrderType::Cover => Direction::Long,
            CtaOrderType::Sell | CtaOrderType::Short => Direction::Short,
        }
    }

    pub fn offset(&self) -> Offset {
        match self {
            CtaOrderType::Buy | CtaOrderType::Short => Offset::Open,
            CtaOrderType::Sell | CtaOrderType::Cover => Offset::Close,
        }
    }
}

impl fmt::Display for CtaOrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status reported by the engine for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Submitting,
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Fully filled or cancelled. `Rejected` does not count.
    pub fn is_filled_or_cancelled(&self) -> bool {
        matches!(self, OrderStatus::AllTraded | OrderStatus::Cancelled)
    }
}

/// Order status update delivered to `on_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub vt_orderid: OrderId,

    /// Instrument identifier (`symbol.exchange`)
    pub vt_symbol: String,

    pub direction: Direction,

    #[serde(default)]
    pub offset: Offset,

    /// Limit price
    pub price: Decimal,

    /// Total order quantity
    pub volume: Decimal,

    /// Quantity filled so far
    #[serde(default)]
    pub traded: Decimal,

    pub status: OrderStatus,

    #[serde(default = "Utc::now")]
    pub datetime: DateTime<Utc>,
}
