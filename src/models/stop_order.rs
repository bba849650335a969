//! Locally managed stop orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{CtaOrderType, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopOrderStatus {
    Waiting,
    Cancelled,
    Triggered,
}

/// Stop order held by the engine until its trigger price is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOrder {
    pub stop_orderid: OrderId,
    pub vt_symbol: String,
    pub order_type: CtaOrderType,
    pub price: Decimal,
    pub volume: Decimal,
    pub status: StopOrderStatus,
    pub strategy_name: String,

    /// Limit orders sent once the stop triggered
    #[serde(default)]
    pub vt_orderids: Vec<OrderId>,
}
