//! Strategy that trades the sum of its signals' positions.

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::CtaEngine;
use crate::models::{BarData, Interval, OrderData, TickData};

use super::settings::{merge_setting, to_setting, Setting};
use super::signal::{CtaSignal, MaCrossSignal};
use super::target_pos::{TargetPosParams, TargetPosTemplate};
use super::template::{CtaTemplate, StrategyContext};

/// Days of history replayed into the signals on init.
const INIT_DAYS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSignalParams {
    /// Fast moving-average window, in bars
    pub fast_window: usize,
    /// Slow moving-average window, in bars
    pub slow_window: usize,
    /// Size each signal bets when it has an opinion
    pub fixed_size: Decimal,
    /// Price step added beyond the best quote
    pub tick_add: Decimal,
}

impl Default for MultiSignalParams {
    fn default() -> Self {
        Self {
            fast_window: 10,
            slow_window: 20,
            fixed_size: dec!(1),
            tick_add: TargetPosParams::default().tick_add,
        }
    }
}

pub struct MultiSignalStrategy {
    target: TargetPosTemplate,
    params: MultiSignalParams,
    signals: Vec<Box<dyn CtaSignal>>,
}

impl MultiSignalStrategy {
    pub const CLASS_NAME: &'static str = "MultiSignalStrategy";
    pub const AUTHOR: &'static str = "vn.py";

    pub fn new(
        engine: Arc<dyn CtaEngine>,
        strategy_name: &str,
        vt_symbol: &str,
        setting: &Setting,
    ) -> Result<Self> {
        let params = MultiSignalParams::default();
        let mut strategy = Self {
            target: TargetPosTemplate::new(engine, strategy_name, vt_symbol, &Setting::new())?,
            signals: build_signals(&params),
            params,
        };
        strategy
            .update_setting(setting)
            .with_context(|| format!("Invalid setting for strategy {}", strategy_name))?;
        Ok(strategy)
    }

    pub fn target(&self) -> &TargetPosTemplate {
        &self.target
    }

    /// Position each signal currently asks for.
    pub fn signal_positions(&self) -> Vec<Decimal> {
        self.signals.iter().map(|s| s.get_signal_pos()).collect()
    }

    /// Sum of signal positions.
    pub fn combined_target(&self) -> Decimal {
        self.signals.iter().map(|s| s.get_signal_pos()).sum()
    }

    pub fn set_target_pos(&mut self, target_pos: Decimal) {
        self.target.set_target_pos(target_pos);
    }
}

fn build_signals(params: &MultiSignalParams) -> Vec<Box<dyn CtaSignal>> {
    vec![Box::new(MaCrossSignal::new(
        params.fast_window,
        params.slow_window,
        params.fixed_size,
    ))]
}

impl CtaTemplate for MultiSignalStrategy {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn author(&self) -> &'static str {
        Self::AUTHOR
    }

    fn ctx(&self) -> &StrategyContext {
        self.target.ctx()
    }

    fn ctx_mut(&mut self) -> &mut StrategyContext {
        self.target.ctx_mut()
    }

    fn parameters(&self) -> Setting {
        to_setting(&self.params)
    }

    fn update_setting(&mut self, setting: &Setting) -> Result<()> {
        let mut params = self.params.clone();
        if merge_setting(&mut params, setting)?.is_empty() {
            return Ok(());
        }

        let target_params = TargetPosParams {
            tick_add: params.tick_add,
        };
        self.target.update_setting(&to_setting(&target_params))?;
        self.signals = build_signals(&params);
        self.params = params;
        Ok(())
    }

    fn variables(&self) -> Setting {
        let mut variables = self.target.variables();
        variables.insert("signal_pos".to_string(), json!(self.signal_positions()));
        variables
    }

    fn restore_variables(&mut self, data: &Setting) -> Result<()> {
        self.target.restore_variables(data)
    }

    fn on_init(&mut self) {
        self.ctx().write_log("Strategy initialized");
        self.load_bar(INIT_DAYS, Interval::Minute);
    }

    fn on_start(&mut self) {
        self.ctx().write_log("Strategy started");
    }

    fn on_stop(&mut self) {
        self.ctx().write_log("Strategy stopped");
    }

    fn on_tick(&mut self, tick: &TickData) {
        for signal in &mut self.signals {
            signal.on_tick(tick);
        }

        self.target.stage_target_pos(self.combined_target());
        self.target.on_tick(tick);
    }

    fn on_bar(&mut self, bar: &BarData) {
        for signal in &mut self.signals {
            signal.on_bar(bar);
        }

        self.target.on_bar(bar);

        let target_pos = self.combined_target();
        if self.ctx().trading() {
            self.target.set_target_pos(target_pos);
        } else {
            self.target.stage_target_pos(target_pos);
        }
    }

    fn on_order(&mut self, order: &OrderData) {
        self.target.on_order(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineType, RecordingEngine};
    use crate::models::CtaOrderType;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;

    fn setting(value: Value) -> Setting {
        value.as_object().cloned().unwrap()
    }

    fn make_bar(minute: i64, close: Decimal) -> BarData {
        BarData {
            vt_symbol: "rb2405.SHFE".to_string(),
            datetime: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
            interval: Interval::Minute,
            open_price: close,
            high_price: close,
            low_price: close,
            close_price: close,
            volume: dec!(5),
            open_interest: Decimal::ZERO,
        }
    }

    fn make_strategy(engine: &Arc<RecordingEngine>) -> MultiSignalStrategy {
        let engine: Arc<dyn CtaEngine> = engine.clone();
        MultiSignalStrategy::new(
            engine,
            "ma_cross",
            "rb2405.SHFE",
            &setting(json!({"fast_window": 2, "slow_window": 3, "fixed_size": 2})),
        )
        .unwrap()
    }

    #[test]
    fn test_parameters_in_declaration_order() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let strategy = make_strategy(&engine);

        let keys: Vec<String> = strategy.get_parameters().keys().cloned().collect();
        assert_eq!(keys, vec!["fast_window", "slow_window", "fixed_size", "tick_add"]);
        assert_eq!(strategy.get_parameters()["fast_window"], json!(2));
    }

    #[test]
    fn test_bars_stage_target_while_not_trading() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);

        for (i, close) in [dec!(10), dec!(11), dec!(12)].into_iter().enumerate() {
            strategy.on_bar(&make_bar(i as i64, close));
        }

        assert_eq!(strategy.signal_positions(), vec![dec!(2)]);
        assert_eq!(strategy.target().target_pos(), dec!(2));
        assert!(engine.orders().is_empty());
        assert!(engine.cancels().is_empty());
    }

    #[test]
    fn test_bars_reconcile_while_trading() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);
        strategy.ctx_mut().mark_inited();
        strategy.ctx_mut().set_trading(true);

        for (i, close) in [dec!(10), dec!(10), dec!(10)].into_iter().enumerate() {
            strategy.on_bar(&make_bar(i as i64, close));
        }
        assert!(engine.orders().is_empty());

        strategy.on_bar(&make_bar(3, dec!(7)));

        let orders = engine.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_type, CtaOrderType::Short);
        assert_eq!(orders[0].volume, dec!(2));
        assert_eq!(orders[0].price, dec!(6));
    }

    #[test]
    fn test_update_setting_rebuilds_signals() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);
        for (i, close) in [dec!(10), dec!(11), dec!(12)].into_iter().enumerate() {
            strategy.on_bar(&make_bar(i as i64, close));
        }
        assert_eq!(strategy.combined_target(), dec!(2));

        strategy
            .update_setting(&setting(json!({"tick_add": "0.5"})))
            .unwrap();

        assert_eq!(strategy.combined_target(), Decimal::ZERO);
        assert_eq!(strategy.target().tick_add(), dec!(0.5));
    }

    #[test]
    fn test_bad_setting_leaves_strategy_unchanged() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Live));
        let mut strategy = make_strategy(&engine);
        let before = strategy.get_parameters();

        let result = strategy.update_setting(&setting(json!({"fast_window": "fast"})));

        assert!(result.is_err());
        assert_eq!(strategy.get_parameters(), before);
    }

    #[test]
    fn test_on_init_warms_signals_from_history() {
        let engine = Arc::new(RecordingEngine::new(EngineType::Backtesting));
        engine.add_history_bars(
            [dec!(12), dec!(11), dec!(10)]
                .into_iter()
                .enumerate()
                .map(|(i, close)| make_bar(i as i64, close)),
        );
        let mut strategy = make_strategy(&engine);

        strategy.on_init();

        assert_eq!(strategy.combined_target(), dec!(-2));
        assert!(engine.orders().is_empty());
        assert_eq!(engine.logs().len(), 1);

        let keys: Vec<String> = strategy.get_variables().keys().cloned().collect();
        assert_eq!(keys, vec!["inited", "trading", "pos", "target_pos", "signal_pos"]);
    }
}
