//! Strategy base: per-instance state, order primitives and the callback
//! surface every strategy exposes to its engine.

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{CtaEngine, EngineType};
use crate::models::{
    BarData, CtaOrderType, Interval, OrderData, OrderId, StopOrder, TickData, TradeData,
};

use super::settings::Setting;

/// Variables every strategy reports ahead of its own, in this order.
pub const BASE_VARIABLES: [&str; 3] = ["inited", "trading", "pos"];

/// Snapshot of a strategy for UI publication and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyData {
    pub strategy_name: String,
    pub vt_symbol: String,
    pub class_name: String,
    pub author: String,
    pub parameters: Setting,
    pub variables: Setting,
}

/// State and engine handle shared by every strategy instance.
///
/// `pos` is owned by the instance but only the engine moves it, through
/// [`StrategyContext::apply_trade`] when a fill is reported.
pub struct StrategyContext {
    engine: Arc<dyn CtaEngine>,
    strategy_name: String,
    vt_symbol: String,
    inited: bool,
    trading: bool,
    pos: Decimal,
}

impl StrategyContext {
    pub fn new(
        engine: Arc<dyn CtaEngine>,
        strategy_name: impl Into<String>,
        vt_symbol: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            strategy_name: strategy_name.into(),
            vt_symbol: vt_symbol.into(),
            inited: false,
            trading: false,
            pos: Decimal::ZERO,
        }
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn vt_symbol(&self) -> &str {
        &self.vt_symbol
    }

    pub fn engine(&self) -> Arc<dyn CtaEngine> {
        Arc::clone(&self.engine)
    }

    pub fn inited(&self) -> bool {
        self.inited
    }

    pub fn trading(&self) -> bool {
        self.trading
    }

    /// Net position: positive long, negative short.
    pub fn pos(&self) -> Decimal {
        self.pos
    }

    /// Called by the engine once `on_init` has completed. Never reverts.
    pub fn mark_inited(&mut self) {
        self.inited = true;
    }

    /// Called by the engine on start/stop.
    pub fn set_trading(&mut self, trading: bool) {
        self.trading = trading;
    }

    /// Called by the engine before `on_trade` for every fill.
    pub fn apply_trade(&mut self, trade: &TradeData) {
        self.pos += trade.position_change();
    }

    /// Called by the engine when restoring persisted state at init.
    pub fn restore_pos(&mut self, pos: Decimal) {
        self.pos = pos;
    }

    pub fn engine_type(&self) -> EngineType {
        self.engine.engine_type()
    }

    /// Open or add to a long position.
    pub fn buy(&self, price: Decimal, volume: Decimal, stop: bool) -> Option<OrderId> {
        self.send_order(CtaOrderType::Buy, price, volume, stop)
    }

    /// Close a long position.
    pub fn sell(&self, price: Decimal, volume: Decimal, stop: bool) -> Option<OrderId> {
        self.send_order(CtaOrderType::Sell, price, volume, stop)
    }

    /// Open or add to a short position.
    pub fn short(&self, price: Decimal, volume: Decimal, stop: bool) -> Option<OrderId> {
        self.send_order(CtaOrderType::Short, price, volume, stop)
    }

    /// Close a short position.
    pub fn cover(&self, price: Decimal, volume: Decimal, stop: bool) -> Option<OrderId> {
        self.send_order(CtaOrderType::Cover, price, volume, stop)
    }

    /// Forward an order to the engine. Returns `None` without contacting the
    /// engine while trading is disabled.
    pub fn send_order(
        &self,
        order_type: CtaOrderType,
        price: Decimal,
        volume: Decimal,
        stop: bool,
    ) -> Option<OrderId> {
        if !self.trading {
            debug!(
                strategy = %self.strategy_name,
                order_type = %order_type,
                "Trading disabled, order not sent"
            );
            return None;
        }

        self.engine.send_order(
            &self.strategy_name,
            &self.vt_symbol,
            order_type,
            price,
            volume,
            stop,
        )
    }

    pub fn cancel_order(&self, vt_orderid: &OrderId) {
        self.engine.cancel_order(&self.strategy_name, vt_orderid);
    }

    /// Cancel every order this strategy has outstanding.
    pub fn cancel_all(&self) {
        self.engine.cancel_all(&self.strategy_name);
    }

    pub fn write_log(&self, msg: &str) {
        self.engine.write_log(&self.strategy_name, msg);
    }

    pub fn send_email(&self, msg: &str) {
        self.engine.send_email(&self.strategy_name, msg);
    }

    fn base_variables(&self) -> Setting {
        let mut variables = Setting::new();
        variables.insert(BASE_VARIABLES[0].to_string(), Value::Bool(self.inited));
        variables.insert(BASE_VARIABLES[1].to_string(), Value::Bool(self.trading));
        variables.insert(
            BASE_VARIABLES[2].to_string(),
            serde_json::to_value(self.pos).unwrap_or(Value::Null),
        );
        variables
    }
}

/// Callback surface and reflection contract of a strategy.
///
/// All callbacks default to no-ops. The engine delivers them serially for
/// one instance.
pub trait CtaTemplate: Send {
    fn class_name(&self) -> &'static str;

    fn author(&self) -> &'static str {
        ""
    }

    fn ctx(&self) -> &StrategyContext;

    fn ctx_mut(&mut self) -> &mut StrategyContext;

    /// Current values of the declared parameters.
    fn parameters(&self) -> Setting;

    /// Overwrite declared parameters present in `setting`; unknown keys are
    /// ignored.
    fn update_setting(&mut self, setting: &Setting) -> Result<()>;

    /// Strategy-declared variables, reported after the base variables.
    fn variables(&self) -> Setting {
        Setting::new()
    }

    /// Assign persisted values to strategy-declared variables.
    fn restore_variables(&mut self, _data: &Setting) -> Result<()> {
        Ok(())
    }

    fn on_init(&mut self) {}

    fn on_start(&mut self) {}

    fn on_stop(&mut self) {}

    fn on_tick(&mut self, _tick: &TickData) {}

    fn on_bar(&mut self, _bar: &BarData) {}

    fn on_trade(&mut self, _trade: &TradeData) {}

    fn on_order(&mut self, _order: &OrderData) {}

    fn on_stop_order(&mut self, _stop_order: &StopOrder) {}

    /// `inited`, `trading`, `pos`, then the strategy's own variables.
    fn get_variables(&self) -> Setting {
        let mut variables = self.ctx().base_variables();
        for (name, value) in self.variables() {
            if !BASE_VARIABLES.contains(&name.as_str()) {
                variables.insert(name, value);
            }
        }
        variables
    }

    fn get_parameters(&self) -> Setting {
        self.parameters()
    }

    fn get_data(&self) -> StrategyData {
        let ctx = self.ctx();
        StrategyData {
            strategy_name: ctx.strategy_name().to_string(),
            vt_symbol: ctx.vt_symbol().to_string(),
            class_name: self.class_name().to_string(),
            author: self.author().to_string(),
            parameters: self.get_parameters(),
            variables: self.get_variables(),
        }
    }

    /// Replay historical bars through `on_bar`.
    fn load_bar(&mut self, days: u32, interval: Interval) {
        let engine = self.ctx().engine();
        let vt_symbol = self.ctx().vt_symbol().to_string();
        engine.load_bar(&vt_symbol, days, interval, &mut |bar| self.on_bar(&bar));
    }

    /// Replay historical bars through a custom handler instead of `on_bar`.
    fn load_bar_with<F>(&mut self, days: u32, interval: Interval, mut callback: F)
    where
        Self: Sized,
        F: FnMut(&mut Self, &BarData),
    {
        let engine = self.ctx().engine();
        let vt_symbol = self.ctx().vt_symbol().to_string();
        engine.load_bar(&vt_symbol, days, interval, &mut |bar| callback(self, &bar));
    }

    /// Replay historical ticks through `on_tick`.
    fn load_tick(&mut self, days: u32) {
        let engine = self.ctx().engine();
        let vt_symbol = self.ctx().vt_symbol().to_string();
        engine.load_tick(&vt_symbol, days, &mut |tick| self.on_tick(&tick));
    }

    /// Publish a snapshot for UI consumers.
    fn put_event(&self) {
        self.ctx().engine().put_strategy_event(&self.get_data());
    }

    /// Persist variables. Only while trading.
    fn sync_data(&self) {
        if self.ctx().trading() {
            self.ctx().engine().sync_strategy_data(&self.get_data());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RecordingEngine;
    use crate::models::{Direction, Offset};
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::strategy::settings::{merge_setting, to_setting};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct BreakoutParams {
        entry_window: usize,
        fixed_size: Decimal,
    }

    impl Default for BreakoutParams {
        fn default() -> Self {
            Self {
                entry_window: 20,
                fixed_size: dec!(1),
            }
        }
    }

    struct BreakoutStrategy {
        ctx: StrategyContext,
        params: BreakoutParams,
        entry_up: Decimal,
        bars_seen: usize,
        last_bids: Vec<Decimal>,
    }

    impl BreakoutStrategy {
        fn new(engine: Arc<dyn CtaEngine>, setting: &Setting) -> Result<Self> {
            let mut strategy = Self {
                ctx: StrategyContext::new(engine, "breakout", "rb2405.SHFE"),
                params: BreakoutParams::default(),
                entry_up: Decimal::ZERO,
                bars_seen: 0,
                last_bids: Vec::new(),
            };
            strategy.update_setting(setting)?;
            Ok(strategy)
        }
    }

    impl CtaTemplate for BreakoutStrategy {
        fn class_name(&self) -> &'static str {
            "BreakoutStrategy"
        }

        fn author(&self) -> &'static str {
            "desk"
        }

        fn ctx(&self) -> &StrategyContext {
            &self.ctx
        }

        fn ctx_mut(&mut self) -> &mut StrategyContext {
            &mut self.ctx
        }

        fn parameters(&self) -> Setting {
            to_setting(&self.params)
        }

        fn update_setting(&mut self, setting: &Setting) -> Result<()> {
            merge_setting(&mut self.params, setting)?;
            Ok(())
        }

        fn variables(&self) -> Setting {
            let mut variables = Setting::new();
            variables.insert("entry_up".to_string(), json!(self.entry_up));
            // Must not displace the base entry.
            variables.insert("pos".to_string(), json!("shadow"));
            variables
        }

        fn on_bar(&mut self, bar: &BarData) {
            self.bars_seen += 1;
            self.entry_up = self.entry_up.max(bar.high_price);
        }

        fn on_tick(&mut self, tick: &TickData) {
            self.last_bids.push(tick.bid_price_1);
        }
    }

    fn setting(value: Value) -> Setting {
        value.as_object().cloned().unwrap()
    }

    fn make_strategy(engine: &Arc<RecordingEngine>) -> BreakoutStrategy {
        let engine: Arc<dyn CtaEngine> = engine.clone();
        BreakoutStrategy::new(engine, &setting(json!({"fixed_size": 3}))).unwrap()
    }

    fn make_bar(high: Decimal) -> BarData {
        BarData {
            vt_symbol: "rb2405.SHFE".to_string(),
            datetime: Utc::now(),
            interval: Interval::Minute,
            open_price: high,
            high_price: high,
            low_price: high,
            close_price: high,
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
        }
    }

    fn make_tick(datetime: DateTime<Utc>, bid: Decimal) -> TickData {
        TickData {
            vt_symbol: "rb2405.SHFE".to_string(),
            datetime,
            last_price: bid,
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            bid_price_1: bid,
            bid_volume_1: dec!(1),
            ask_price_1: bid + dec!(1),
            ask_volume_1: dec!(1),
            limit_up: None,
            limit_down: None,
        }
    }

    #[test]
    fn test_order_primitives_require_trading() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);

        assert!(strategy.ctx.buy(dec!(100), dec!(1), false).is_none());
        assert!(strategy.ctx.sell(dec!(100), dec!(1), false).is_none());
        assert!(strategy.ctx.short(dec!(100), dec!(1), false).is_none());
        assert!(strategy.ctx.cover(dec!(100), dec!(1), false).is_none());
        assert!(engine.orders().is_empty());

        strategy.ctx_mut().set_trading(true);
        let id = strategy.ctx.cover(dec!(101), dec!(2), true).unwrap();

        let orders = engine.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].vt_orderid, id);
        assert_eq!(orders[0].order_type, CtaOrderType::Cover);
        assert_eq!(orders[0].strategy_name, "breakout");
        assert_eq!(orders[0].vt_symbol, "rb2405.SHFE");
        assert!(orders[0].stop);
    }

    #[test]
    fn test_variables_start_with_base_entries() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let strategy = make_strategy(&engine);

        let variables = strategy.get_variables();
        let keys: Vec<&str> = variables.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["inited", "trading", "pos", "entry_up"]);
        assert_eq!(variables["inited"], json!(false));
        assert_eq!(variables["trading"], json!(false));
        let pos: Decimal = serde_json::from_value(variables["pos"].clone()).unwrap();
        assert_eq!(pos, Decimal::ZERO);
    }

    #[test]
    fn test_snapshots_reflect_current_values() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);

        strategy.ctx_mut().apply_trade(&TradeData {
            vt_tradeid: "T1".to_string(),
            vt_orderid: OrderId::from("O1"),
            vt_symbol: "rb2405.SHFE".to_string(),
            direction: Direction::Short,
            offset: Offset::Open,
            price: dec!(3600),
            volume: dec!(2),
            datetime: Utc::now(),
        });
        strategy.update_setting(&setting(json!({"entry_window": 55}))).unwrap();

        let data = strategy.get_data();
        assert_eq!(data.strategy_name, "breakout");
        assert_eq!(data.class_name, "BreakoutStrategy");
        assert_eq!(data.author, "desk");
        assert_eq!(data.parameters["entry_window"], json!(55));
        let fixed_size: Decimal =
            serde_json::from_value(data.parameters["fixed_size"].clone()).unwrap();
        assert_eq!(fixed_size, dec!(3));
        let pos: Decimal = serde_json::from_value(data.variables["pos"].clone()).unwrap();
        assert_eq!(pos, dec!(-2));
    }

    #[test]
    fn test_unknown_setting_is_ignored() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);
        let before = strategy.get_parameters();

        strategy
            .update_setting(&setting(json!({"unknownKey": 1})))
            .unwrap();

        assert_eq!(strategy.get_parameters(), before);
    }

    #[test]
    fn test_load_bar_defaults_to_on_bar() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Backtesting));
        engine.add_history_bars(vec![make_bar(dec!(10)), make_bar(dec!(12))]);
        let mut strategy = make_strategy(&engine);

        strategy.load_bar(10, Interval::Minute);
        assert_eq!(strategy.bars_seen, 2);
        assert_eq!(strategy.entry_up, dec!(12));

        let mut highs = Vec::new();
        strategy.load_bar_with(10, Interval::Minute, |s, bar| {
            s.bars_seen += 10;
            highs.push(bar.high_price);
        });
        assert_eq!(strategy.bars_seen, 22);
        assert_eq!(highs, vec![dec!(10), dec!(12)]);
    }

    #[test]
    fn test_load_tick_feeds_on_tick() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Backtesting));
        let newest = Utc::now();
        engine.add_history_ticks(vec![
            make_tick(newest - Duration::days(5), dec!(3590)),
            make_tick(newest - Duration::days(1), dec!(3600)),
            make_tick(newest, dec!(3610)),
        ]);
        let mut strategy = make_strategy(&engine);

        strategy.load_tick(2);

        assert_eq!(strategy.last_bids, vec![dec!(3600), dec!(3610)]);
        assert_eq!(strategy.bars_seen, 0);
    }

    #[test]
    fn test_sync_data_only_while_trading() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);

        strategy.sync_data();
        assert!(engine.synced().is_empty());

        strategy.ctx_mut().set_trading(true);
        strategy.sync_data();
        strategy.put_event();
        assert_eq!(engine.synced().len(), 1);
        assert_eq!(engine.updates().len(), 1);
    }

    #[test]
    fn test_cancel_and_log_forward_to_engine() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let strategy = make_strategy(&engine);

        strategy.ctx.cancel_order(&OrderId::from("O9"));
        strategy.ctx.cancel_all();
        strategy.ctx.write_log("ready");
        strategy.ctx.send_email("hi");

        assert_eq!(engine.cancels().len(), 2);
        assert_eq!(engine.logs(), vec![("breakout".to_string(), "ready".to_string())]);
        assert_eq!(engine.emails().len(), 1);
    }
}
