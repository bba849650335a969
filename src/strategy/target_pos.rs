//! Target-position trading: reconcile the actual net position toward a
//! desired one by sending correctly priced, non-overlapping orders.
//!
//! Each reconciliation attempt:
//! 1. cancels every outstanding order of the strategy
//! 2. stops if the target already equals the position
//! 3. prices off the last tick (best quote ± `tick_add`, clamped to the
//!    session limits) or, before any tick, the last bar close ± `tick_add`
//! 4. sends one order, sized by engine mode:
//!    - backtesting: the full delta as a single open order
//!    - live: nothing while any order is still pending; otherwise close the
//!      opposite position first (never more than it holds), or open from
//!      flat or the same side
//!
//! Arithmetic that would overflow skips the attempt.

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::engine::{CtaEngine, EngineType};
use crate::models::{BarData, CtaOrderType, OrderData, OrderId, TickData};

use super::settings::{merge_setting, to_setting, Setting};
use super::template::{CtaTemplate, StrategyContext};

/// Configurable parameters of [`TargetPosTemplate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPosParams {
    /// Price step added beyond the best quote to improve fill odds
    pub tick_add: Decimal,
}

impl Default for TargetPosParams {
    fn default() -> Self {
        Self { tick_add: dec!(1) }
    }
}

/// A single order the reconciliation wants to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub order_type: CtaOrderType,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Price for moving the position by `delta`.
///
/// Tick pricing wins when a tick exists: ask + `tick_add` capped at the
/// up-limit for buys, bid − `tick_add` floored at the down-limit for sells.
/// Otherwise the bar close ± `tick_add`, unclamped. `None` without market
/// data or when the adjusted price overflows.
pub fn reference_price(
    delta: Decimal,
    tick: Option<&TickData>,
    bar: Option<&BarData>,
    tick_add: Decimal,
) -> Option<Decimal> {
    let buying = delta > Decimal::ZERO;

    if let Some(tick) = tick {
        let price = if buying {
            let price = tick.ask_price_1.checked_add(tick_add)?;
            match tick.active_limit_up() {
                Some(limit_up) => price.min(limit_up),
                None => price,
            }
        } else {
            let price = tick.bid_price_1.checked_sub(tick_add)?;
            match tick.active_limit_down() {
                Some(limit_down) => price.max(limit_down),
                None => price,
            }
        };
        return Some(price);
    }

    let bar = bar?;
    if buying {
        bar.close_price.checked_add(tick_add)
    } else {
        bar.close_price.checked_sub(tick_add)
    }
}

/// Backtesting sizing: one open order for the whole delta, regardless of
/// the current position's sign.
pub fn plan_backtesting(delta: Decimal, price: Decimal) -> Option<OrderPlan> {
    if delta.is_zero() {
        return None;
    }

    let order_type = if delta > Decimal::ZERO {
        CtaOrderType::Buy
    } else {
        CtaOrderType::Short
    };

    Some(OrderPlan {
        order_type,
        price,
        volume: delta.abs(),
    })
}

/// Live sizing: close the opposite side first, capped at what is held;
/// open only from flat or same-side.
pub fn plan_live(delta: Decimal, pos: Decimal, price: Decimal) -> Option<OrderPlan> {
    if delta.is_zero() {
        return None;
    }

    let (order_type, volume) = if delta > Decimal::ZERO {
        if pos < Decimal::ZERO {
            (CtaOrderType::Cover, delta.min(pos.abs()))
        } else {
            (CtaOrderType::Buy, delta)
        }
    } else if pos > Decimal::ZERO {
        (CtaOrderType::Sell, delta.abs().min(pos))
    } else {
        (CtaOrderType::Short, delta.abs())
    };

    Some(OrderPlan {
        order_type,
        price,
        volume,
    })
}

/// Strategy template that trades toward an externally set target position.
pub struct TargetPosTemplate {
    ctx: StrategyContext,
    params: TargetPosParams,
    target_pos: Decimal,
    last_tick: Option<TickData>,
    last_bar: Option<BarData>,
    pending_orders: Vec<OrderId>,
}

impl TargetPosTemplate {
    pub const CLASS_NAME: &'static str = "TargetPosTemplate";
    pub const AUTHOR: &'static str = "vn.py";

    pub fn new(
        engine: Arc<dyn CtaEngine>,
        strategy_name: &str,
        vt_symbol: &str,
        setting: &Setting,
    ) -> Result<Self> {
        let mut strategy = Self {
            ctx: StrategyContext::new(engine, strategy_name, vt_symbol),
            params: TargetPosParams::default(),
            target_pos: Decimal::ZERO,
            last_tick: None,
            last_bar: None,
            pending_orders: Vec::new(),
        };
        strategy
            .update_setting(setting)
            .with_context(|| format!("Invalid setting for strategy {}", strategy_name))?;
        Ok(strategy)
    }

    pub fn target_pos(&self) -> Decimal {
        self.target_pos
    }

    pub fn tick_add(&self) -> Decimal {
        self.params.tick_add
    }

    pub fn last_tick(&self) -> Option<&TickData> {
        self.last_tick.as_ref()
    }

    pub fn last_bar(&self) -> Option<&BarData> {
        self.last_bar.as_ref()
    }

    /// Orders sent and not yet reported fully traded or cancelled.
    pub fn pending_orders(&self) -> &[OrderId] {
        &self.pending_orders
    }

    /// Set the desired net position and reconcile immediately.
    pub fn set_target_pos(&mut self, target_pos: Decimal) {
        self.target_pos = target_pos;
        self.trade();
    }

    /// Set the desired net position without reconciling; the next trigger
    /// (tick or explicit command) acts on it.
    pub fn stage_target_pos(&mut self, target_pos: Decimal) {
        self.target_pos = target_pos;
    }

    /// Run one reconciliation attempt.
    pub fn trade(&mut self) {
        self.ctx.cancel_all();

        let pos = self.ctx.pos();
        let Some(delta) = self.target_pos.checked_sub(pos) else {
            debug!(
                strategy = %self.ctx.strategy_name(),
                target = %self.target_pos,
                pos = %pos,
                "Position delta overflows, skipping reconciliation"
            );
            return;
        };
        if delta.is_zero() {
            return;
        }

        let Some(price) = reference_price(
            delta,
            self.last_tick.as_ref(),
            self.last_bar.as_ref(),
            self.params.tick_add,
        ) else {
            debug!(strategy = %self.ctx.strategy_name(), "No usable price, nothing to send");
            return;
        };

        let plan = match self.ctx.engine_type() {
            EngineType::Backtesting => plan_backtesting(delta, price),
            EngineType::Live => {
                if !self.pending_orders.is_empty() {
                    debug!(
                        strategy = %self.ctx.strategy_name(),
                        pending = self.pending_orders.len(),
                        "Orders still pending, skipping reconciliation"
                    );
                    return;
                }
                plan_live(delta, pos, price)
            }
        };

        let Some(plan) = plan else {
            return;
        };

        debug!(
            strategy = %self.ctx.strategy_name(),
            target = %self.target_pos,
            pos = %pos,
            order_type = %plan.order_type,
            price = %plan.price,
            volume = %plan.volume,
            "Reconciling toward target"
        );

        let sent = self.ctx.send_order(plan.order_type, plan.price, plan.volume, false);
        if let Some(vt_orderid) = sent {
            self.pending_orders.push(vt_orderid);
        }
    }
}

impl CtaTemplate for TargetPosTemplate {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn author(&self) -> &'static str {
        Self::AUTHOR
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
        variables.insert("target_pos".to_string(), json!(self.target_pos));
        variables
    }

    fn restore_variables(&mut self, data: &Setting) -> Result<()> {
        if let Some(value) = data.get("target_pos") {
            self.target_pos = serde_json::from_value(value.clone())
                .context("Invalid persisted target_pos")?;
        }
        Ok(())
    }

    fn on_tick(&mut self, tick: &TickData) {
        self.last_tick = Some(tick.clone());

        if self.ctx.trading() {
            self.trade();
        }
    }

    /// Bars only refresh the cached observation; they never reconcile.
    fn on_bar(&mut self, bar: &BarData) {
        self.last_bar = Some(bar.clone());
    }

    fn on_order(&mut self, order: &OrderData) {
        if !order.status.is_filled_or_cancelled() {
            return;
        }

        if let Some(idx) = self
            .pending_orders
            .iter()
            .position(|id| *id == order.vt_orderid)
        {
            self.pending_orders.remove(idx);
        }
    }
}
