//! Engine boundary: the operations a strategy may invoke on its owning engine.
//!
//! Strategies never look an engine up globally. Each instance is handed an
//! `Arc<dyn CtaEngine>` at construction and every call is tagged with the
//! strategy's name so the engine can attribute orders and events.

mod recording;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{BarData, CtaOrderType, Interval, OrderId, TickData};
use crate::strategy::StrategyData;

pub use recording::{CancelRequest, EngineEvent, RecordingEngine, SentOrder};

/// Execution environment the owning engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Backtesting,
    Live,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Backtesting => "backtesting",
            EngineType::Live => "live",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations consumed by strategies. Submission and cancellation are
/// fire-and-forget; outcomes come back later through the strategy callbacks.
pub trait CtaEngine: Send + Sync {
    fn engine_type(&self) -> EngineType;

    /// Submit an order on behalf of `strategy`. `None` when the engine
    /// refuses the request outright.
    fn send_order(
        &self,
        strategy: &str,
        vt_symbol: &str,
        order_type: CtaOrderType,
        price: Decimal,
        volume: Decimal,
        stop: bool,
    ) -> Option<OrderId>;

    fn cancel_order(&self, strategy: &str, vt_orderid: &OrderId);

    /// Cancel every outstanding order (limit and stop) sent by `strategy`.
    fn cancel_all(&self, strategy: &str);

    /// Replay historical bars through `callback`, oldest first.
    fn load_bar(
        &self,
        vt_symbol: &str,
        days: u32,
        interval: Interval,
        callback: &mut dyn FnMut(BarData),
    );

    /// Replay historical ticks through `callback`, oldest first.
    fn load_tick(&self, vt_symbol: &str, days: u32, callback: &mut dyn FnMut(TickData));

    fn write_log(&self, strategy: &str, msg: &str) {
        info!(strategy = %strategy, "{}", msg);
    }

    fn send_email(&self, _strategy: &str, _msg: &str) {}

    /// Publish a fresh strategy snapshot for UI consumers.
    fn put_strategy_event(&self, _data: &StrategyData) {}

    /// Persist the strategy's variables.
    fn sync_strategy_data(&self, _data: &StrategyData) {}
}
