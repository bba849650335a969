//! In-memory engine that records every request it receives.
//!
//! Used by the replay driver and throughout the test suite. It performs no
//! matching: orders are accepted, stored and left for the caller to resolve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{BarData, CtaOrderType, Interval, OrderId, TickData};
use crate::strategy::StrategyData;

use super::{CtaEngine, EngineType};

/// An order request as received by the engine.
#[derive(Debug, Clone)]
pub struct SentOrder {
    pub vt_orderid: OrderId,
    pub strategy_name: String,
    pub vt_symbol: String,
    pub order_type: CtaOrderType,
    pub price: Decimal,
    pub volume: Decimal,
    pub stop: bool,
    pub sent_at: DateTime<Utc>,
}

/// A cancellation request as received by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelRequest {
    Order { strategy: String, vt_orderid: OrderId },
    All { strategy: String },
}

/// Fire-and-forget notifications forwarded to an optional listener.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Log { strategy: String, msg: String },
    Email { strategy: String, msg: String },
    StrategyUpdate(StrategyData),
    SyncData(StrategyData),
}

#[derive(Default)]
struct RecordingState {
    orders: Vec<SentOrder>,
    cancels: Vec<CancelRequest>,
    logs: Vec<(String, String)>,
    emails: Vec<(String, String)>,
    updates: Vec<StrategyData>,
    synced: Vec<StrategyData>,
    history_bars: Vec<BarData>,
    history_ticks: Vec<TickData>,
}

/// Engine double that records requests and serves preloaded history.
pub struct RecordingEngine {
    engine_type: EngineType,
    reject_orders: AtomicBool,
    state: Mutex<RecordingState>,
    listener: Option<UnboundedSender<EngineEvent>>,
}

impl RecordingEngine {
    pub fn new(engine_type: EngineType) -> Self {
        Self {
            engine_type,
            reject_orders: AtomicBool::new(false),
            state: Mutex::new(RecordingState::default()),
            listener: None,
        }
    }

    /// Forward logs, emails, strategy updates and sync requests to `tx`.
    pub fn with_listener(mut self, tx: UnboundedSender<EngineEvent>) -> Self {
        self.listener = Some(tx);
        self
    }

    /// Make subsequent `send_order` calls return `None`.
    pub fn set_reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::SeqCst);
    }

    /// Bars served by `load_bar`.
    pub fn add_history_bars(&self, bars: impl IntoIterator<Item = BarData>) {
        let mut state = self.lock();
        state.history_bars.extend(bars);
        state.history_bars.sort_by_key(|b| b.datetime);
    }

    /// Ticks served by `load_tick`.
    pub fn add_history_ticks(&self, ticks: impl IntoIterator<Item = TickData>) {
        let mut state = self.lock();
        state.history_ticks.extend(ticks);
        state.history_ticks.sort_by_key(|t| t.datetime);
    }

    /// All orders received so far.
    pub fn orders(&self) -> Vec<SentOrder> {
        self.lock().orders.clone()
    }

    /// Drain the orders received so far.
    pub fn take_orders(&self) -> Vec<SentOrder> {
        std::mem::take(&mut self.lock().orders)
    }

    pub fn cancels(&self) -> Vec<CancelRequest> {
        self.lock().cancels.clone()
    }

    /// Drain the cancellation requests received so far.
    pub fn take_cancels(&self) -> Vec<CancelRequest> {
        std::mem::take(&mut self.lock().cancels)
    }

    pub fn logs(&self) -> Vec<(String, String)> {
        self.lock().logs.clone()
    }

    pub fn emails(&self) -> Vec<(String, String)> {
        self.lock().emails.clone()
    }

    /// Snapshots published through `put_strategy_event`.
    pub fn updates(&self) -> Vec<StrategyData> {
        self.lock().updates.clone()
    }

    /// Snapshots published through `sync_strategy_data`.
    pub fn synced(&self) -> Vec<StrategyData> {
        self.lock().synced.clone()
    }

    /// Drain the synced snapshots.
    pub fn take_synced(&self) -> Vec<StrategyData> {
        std::mem::take(&mut self.lock().synced)
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: EngineEvent) {
        if let Some(tx) = &self.listener {
            // Listener gone means nobody is interested any more.
            let _ = tx.send(event);
        }
    }
}

impl CtaEngine for RecordingEngine {
    fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    fn send_order(
        &self,
        strategy: &str,
        vt_symbol: &str,
        order_type: CtaOrderType,
        price: Decimal,
        volume: Decimal,
        stop: bool,
    ) -> Option<OrderId> {
        if self.reject_orders.load(Ordering::SeqCst) {
            debug!(strategy = %strategy, "Order request rejected");
            return None;
        }

        let vt_orderid = OrderId::new(Uuid::new_v4().simple().to_string());
        info!(
            strategy = %strategy,
            order_id = %vt_orderid,
            order_type = %order_type,
            price = %price,
            volume = %volume,
            stop = stop,
            "Order sent"
        );

        self.lock().orders.push(SentOrder {
            vt_orderid: vt_orderid.clone(),
            strategy_name: strategy.to_string(),
            vt_symbol: vt_symbol.to_string(),
            order_type,
            price,
            volume,
            stop,
            sent_at: Utc::now(),
        });

        Some(vt_orderid)
    }

    fn cancel_order(&self, strategy: &str, vt_orderid: &OrderId) {
        debug!(strategy = %strategy, order_id = %vt_orderid, "Cancel order");
        self.lock().cancels.push(CancelRequest::Order {
            strategy: strategy.to_string(),
            vt_orderid: vt_orderid.clone(),
        });
    }

    fn cancel_all(&self, strategy: &str) {
        debug!(strategy = %strategy, "Cancel all orders");
        self.lock().cancels.push(CancelRequest::All {
            strategy: strategy.to_string(),
        });
    }

    fn load_bar(
        &self,
        vt_symbol: &str,
        days: u32,
        interval: Interval,
        callback: &mut dyn FnMut(BarData),
    ) {
        let bars = {
            let state = self.lock();
            recent_window(
                &state.history_bars,
                days,
                |b| b.vt_symbol == vt_symbol && b.interval == interval,
                |b| b.datetime,
            )
        };

        info!(vt_symbol = %vt_symbol, days = days, interval = %interval, count = bars.len(), "Loading bars");
        for bar in bars {
            callback(bar);
        }
    }

    fn load_tick(&self, vt_symbol: &str, days: u32, callback: &mut dyn FnMut(TickData)) {
        let ticks = {
            let state = self.lock();
            recent_window(
                &state.history_ticks,
                days,
                |t| t.vt_symbol == vt_symbol,
                |t| t.datetime,
            )
        };

        info!(vt_symbol = %vt_symbol, days = days, count = ticks.len(), "Loading ticks");
        for tick in ticks {
            callback(tick);
        }
    }

    fn write_log(&self, strategy: &str, msg: &str) {
        info!(strategy = %strategy, "{}", msg);
        self.lock().logs.push((strategy.to_string(), msg.to_string()));
        self.notify(EngineEvent::Log {
            strategy: strategy.to_string(),
            msg: msg.to_string(),
        });
    }

    fn send_email(&self, strategy: &str, msg: &str) {
        self.lock().emails.push((strategy.to_string(), msg.to_string()));
        self.notify(EngineEvent::Email {
            strategy: strategy.to_string(),
            msg: msg.to_string(),
        });
    }

    fn put_strategy_event(&self, data: &StrategyData) {
        self.lock().updates.push(data.clone());
        self.notify(EngineEvent::StrategyUpdate(data.clone()));
    }

    fn sync_strategy_data(&self, data: &StrategyData) {
        self.lock().synced.push(data.clone());
        self.notify(EngineEvent::SyncData(data.clone()));
    }
}

/// Items accepted by `filter` whose timestamp lies within `days` of the
/// newest accepted item. `items` must be sorted by time.
fn recent_window<T: Clone>(
    items: &[T],
    days: u32,
    filter: impl Fn(&T) -> bool,
    datetime: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let matching: Vec<&T> = items.iter().filter(|item| filter(item)).collect();

    let Some(newest) = matching.last().map(|item| datetime(item)) else {
        return Vec::new();
    };
    // A window reaching past the representable range covers everything.
    let start = newest.checked_sub_signed(Duration::days(i64::from(days)));

    matching
        .into_iter()
        .filter(|item| start.map_or(true, |start| datetime(item) >= start))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn make_bar(day: u32, close: Decimal) -> BarData {
        BarData {
            vt_symbol: "rb2405.SHFE".to_string(),
            datetime: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            interval: Interval::Minute,
            open_price: close,
            high_price: close,
            low_price: close,
            close_price: close,
            volume: dec!(10),
            open_interest: Decimal::ZERO,
        }
    }

    #[test]
    fn test_send_order_records_request() {
        let engine = RecordingEngine::new(EngineType::Live);
        let id = engine
            .send_order("s1", "rb2405.SHFE", CtaOrderType::Buy, dec!(3600), dec!(2), false)
            .unwrap();

        let orders = engine.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].vt_orderid, id);
        assert_eq!(orders[0].order_type, CtaOrderType::Buy);
        assert_eq!(orders[0].volume, dec!(2));
        assert!(!orders[0].stop);

        assert_eq!(engine.take_orders().len(), 1);
        assert!(engine.orders().is_empty());
    }

    #[test]
    fn test_rejecting_engine_returns_none() {
        let engine = RecordingEngine::new(EngineType::Live);
        engine.set_reject_orders(true);

        let id =
            engine.send_order("s1", "rb2405.SHFE", CtaOrderType::Sell, dec!(1), dec!(1), false);
        assert!(id.is_none());
        assert!(engine.orders().is_empty());
    }

    #[test]
    fn test_load_bar_window_is_relative_to_newest_bar() {
        let engine = RecordingEngine::new(EngineType::Backtesting);
        engine.add_history_bars(vec![
            make_bar(10, dec!(3)),
            make_bar(1, dec!(1)),
            make_bar(8, dec!(2)),
        ]);

        let mut closes = Vec::new();
        engine.load_bar("rb2405.SHFE", 3, Interval::Minute, &mut |bar| {
            closes.push(bar.close_price)
        });
        assert_eq!(closes, vec![dec!(2), dec!(3)]);

        let mut other = 0;
        engine.load_bar("IF2401.CFFEX", 30, Interval::Minute, &mut |_| other += 1);
        assert_eq!(other, 0);
    }

    #[test]
    fn test_huge_window_returns_full_history() {
        let engine = RecordingEngine::new(EngineType::Backtesting);
        engine.add_history_bars(vec![make_bar(1, dec!(1)), make_bar(10, dec!(3))]);

        let mut count = 0;
        engine.load_bar("rb2405.SHFE", u32::MAX, Interval::Minute, &mut |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_listener_receives_logs() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = RecordingEngine::new(EngineType::Live).with_listener(tx);

        engine.write_log("s1", "hello");

        match rx.try_recv().unwrap() {
            EngineEvent::Log { strategy, msg } => {
                assert_eq!(strategy, "s1");
                assert_eq!(msg, "hello");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(engine.logs(), vec![("s1".to_string(), "hello".to_string())]);
    }
}
