//! Data models for market observations, orders, fills and stop orders.

mod bar;
mod order;
mod stop_order;
mod tick;
mod trade;

pub use bar::{BarData, Interval};
pub use order::{CtaOrderType, Direction, Offset, OrderData, OrderId, OrderStatus};
pub use stop_order::{StopOrder, StopOrderStatus};
pub use tick::TickData;
pub use trade::TradeData;
