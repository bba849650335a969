//! Event replay for exercising target-position trading offline.
//!
//! Features:
//! - Feed recorded ticks, bars and target changes through a strategy runner
//! - Acknowledge cancel-all requests for still-working orders
//! - Optionally report every sent order as fully filled at its price
//! - Optionally restore and persist strategy variables through a store
//! - Summarize orders, fills and the final position

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::db::StrategyStore;
use crate::engine::{CancelRequest, CtaEngine, EngineType, RecordingEngine, SentOrder};
use crate::models::{
    BarData, CtaOrderType, OrderData, OrderId, OrderStatus, TickData, TradeData,
};
use crate::runner::{StrategyEvent, StrategyHandle, StrategyRunner};
use crate::strategy::{CtaTemplate, Setting, TargetPosTemplate};

/// How the replay resolves orders the strategy sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Every order fills completely at its limit price
    #[default]
    Immediate,
    /// Orders never fill; they stay working until cancelled
    None,
}

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Name of the replayed strategy instance
    pub strategy_name: String,

    /// Instrument the strategy trades
    pub vt_symbol: String,

    /// Engine mode the strategy sees
    pub mode: EngineType,

    /// Order resolution
    pub fill: FillMode,

    /// Price step beyond the best quote
    pub tick_add: Decimal,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            strategy_name: "replay".to_string(),
            vt_symbol: "IF2401.CFFEX".to_string(),
            mode: EngineType::Backtesting,
            fill: FillMode::Immediate,
            tick_add: dec!(1),
        }
    }
}

/// One line of a replay file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplayEvent {
    Tick(TickData),
    Bar(BarData),
    Target { target_pos: Decimal },
}

impl ReplayEvent {
    fn datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ReplayEvent::Tick(tick) => Some(tick.datetime),
            ReplayEvent::Bar(bar) => Some(bar.datetime),
            ReplayEvent::Target { .. } => None,
        }
    }
}

/// Parse JSON-lines replay events. Blank lines and `#` comments are skipped.
pub fn parse_events(text: &str) -> Result<Vec<ReplayEvent>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", idx + 1))
        })
        .collect()
}

/// Replay summary.
#[derive(Debug, Clone)]
pub struct ReplayResults {
    /// Engine mode the strategy saw
    pub mode: EngineType,

    pub ticks: usize,
    pub bars: usize,
    pub targets: usize,

    /// Orders sent per type, in Buy/Sell/Short/Cover order
    pub orders_by_type: Vec<(CtaOrderType, usize)>,

    /// Orders reported fully filled
    pub fills: usize,

    /// Volume across all fills
    pub traded_volume: Decimal,

    /// Orders reported cancelled
    pub cancellations: usize,

    pub final_pos: Decimal,
    pub final_target: Decimal,

    /// Orders still pending in the strategy at the end
    pub pending_orders: Vec<OrderId>,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ReplayResults {
    pub fn total_orders(&self) -> usize {
        self.orders_by_type.iter().map(|(_, count)| count).sum()
    }

    pub fn orders_of(&self, order_type: CtaOrderType) -> usize {
        self.orders_by_type
            .iter()
            .find(|(t, _)| *t == order_type)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

impl fmt::Display for ReplayResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n{:=^60}", " REPLAY RESULTS ")?;
        writeln!(f)?;
        writeln!(f, "Mode:        {}", self.mode)?;
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            writeln!(
                f,
                "Period:      {} to {}",
                start.format("%Y-%m-%d %H:%M:%S"),
                end.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        writeln!(f)?;
        writeln!(f, "--- Events ---")?;
        writeln!(f, "Ticks:       {}", self.ticks)?;
        writeln!(f, "Bars:        {}", self.bars)?;
        writeln!(f, "Targets:     {}", self.targets)?;
        writeln!(f)?;
        writeln!(f, "--- Orders ---")?;
        writeln!(f, "Total:       {}", self.total_orders())?;
        for (order_type, count) in &self.orders_by_type {
            writeln!(f, "{:<12} {}", format!("{}:", order_type), count)?;
        }
        writeln!(f, "Fills:       {} ({} lots)", self.fills, self.traded_volume)?;
        writeln!(f, "Cancelled:   {}", self.cancellations)?;
        writeln!(f)?;
        writeln!(f, "--- Position ---")?;
        writeln!(f, "Final Pos:   {}", self.final_pos)?;
        writeln!(f, "Target:      {}", self.final_target)?;
        writeln!(f, "Pending:     {}", self.pending_orders.len())?;
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

/// Drives a [`TargetPosTemplate`] through recorded events.
pub struct Replayer {
    config: ReplayConfig,
    engine: Arc<RecordingEngine>,
    handle: StrategyHandle<TargetPosTemplate>,
    store: Option<StrategyStore>,
    working: Vec<SentOrder>,
    sent: Vec<SentOrder>,
    fills: usize,
    traded_volume: Decimal,
    cancellations: usize,
    next_trade_id: u64,
}

impl Replayer {
    /// Build the strategy and bring it to the trading state.
    pub fn new(config: ReplayConfig) -> Result<Self> {
        Self::build(config, None, None)
    }

    /// Like [`Replayer::new`], restoring the strategy's stored variables and
    /// saving every synced snapshot back to `store`.
    pub async fn with_store(config: ReplayConfig, store: StrategyStore) -> Result<Self> {
        let restored = store.load_data(&config.strategy_name).await?;
        if restored.is_some() {
            info!(strategy = %config.strategy_name, "Restoring stored strategy data");
        }
        Self::build(config, restored, Some(store))
    }

    fn build(
        config: ReplayConfig,
        restored: Option<Setting>,
        store: Option<StrategyStore>,
    ) -> Result<Self> {
        let engine = Arc::new(RecordingEngine::new(config.mode));

        let mut setting = Setting::new();
        setting.insert("tick_add".to_string(), json!(config.tick_add));
        let strategy_engine: Arc<dyn CtaEngine> = engine.clone();
        let strategy = TargetPosTemplate::new(
            strategy_engine,
            &config.strategy_name,
            &config.vt_symbol,
            &setting,
        )?;

        let handle = StrategyRunner::spawn(strategy);
        handle.send(StrategyEvent::Init(restored))?;
        handle.send(StrategyEvent::Start)?;

        Ok(Self {
            config,
            engine,
            handle,
            store,
            working: Vec::new(),
            sent: Vec::new(),
            fills: 0,
            traded_volume: Decimal::ZERO,
            cancellations: 0,
            next_trade_id: 1,
        })
    }

    /// Replay every event in order and return the summary.
    pub async fn run(mut self, events: &[ReplayEvent]) -> Result<ReplayResults> {
        info!(
            mode = %self.config.mode,
            fill = ?self.config.fill,
            events = events.len(),
            "Starting replay"
        );

        let (mut ticks, mut bars, mut targets) = (0, 0, 0);
        for event in events {
            match event {
                ReplayEvent::Tick(tick) => {
                    ticks += 1;
                    self.handle.send(StrategyEvent::Tick(tick.clone()))?;
                }
                ReplayEvent::Bar(bar) => {
                    bars += 1;
                    self.handle.send(StrategyEvent::Bar(bar.clone()))?;
                }
                ReplayEvent::Target { target_pos } => {
                    targets += 1;
                    let target_pos = *target_pos;
                    self.handle
                        .execute(move |s: &mut TargetPosTemplate| s.set_target_pos(target_pos))?;
                }
            }
            self.settle().await?;
        }

        // Stopping syncs the final state.
        self.handle.send(StrategyEvent::Stop)?;
        self.handle.snapshot().await?;
        self.persist().await?;

        let strategy = self.handle.shutdown().await?;
        let results = ReplayResults {
            mode: self.config.mode,
            ticks,
            bars,
            targets,
            orders_by_type: count_by_type(&self.sent),
            fills: self.fills,
            traded_volume: self.traded_volume,
            cancellations: self.cancellations,
            final_pos: strategy.ctx().pos(),
            final_target: strategy.target_pos(),
            pending_orders: strategy.pending_orders().to_vec(),
            start_time: events.iter().find_map(ReplayEvent::datetime),
            end_time: events.iter().rev().find_map(ReplayEvent::datetime),
        };

        info!(
            orders = results.total_orders(),
            fills = results.fills,
            pos = %results.final_pos,
            "Replay complete"
        );
        Ok(results)
    }

    /// Resolve what the strategy requested while handling the last event.
    /// Within one reconciliation the cancel-all precedes the new order, so
    /// cancels apply to orders that were already working.
    async fn settle(&mut self) -> Result<()> {
        // Wait until the runner has handled everything queued so far.
        self.handle.snapshot().await?;

        for cancel in self.engine.take_cancels() {
            match cancel {
                CancelRequest::All { .. } => {
                    for order in std::mem::take(&mut self.working) {
                        self.report(&order, OrderStatus::Cancelled)?;
                        self.cancellations += 1;
                    }
                }
                CancelRequest::Order { vt_orderid, .. } => {
                    let found = self.working.iter().position(|o| o.vt_orderid == vt_orderid);
                    if let Some(idx) = found {
                        let order = self.working.remove(idx);
                        self.report(&order, OrderStatus::Cancelled)?;
                        self.cancellations += 1;
                    }
                }
            }
        }

        for order in self.engine.take_orders() {
            self.sent.push(order.clone());
            match self.config.fill {
                FillMode::Immediate => self.fill(&order)?,
                FillMode::None => self.working.push(order),
            }
        }

        // Make the reports visible before the next event is fed.
        self.handle.snapshot().await?;
        self.persist().await
    }

    /// Save the latest synced snapshot, if a store is attached.
    async fn persist(&self) -> Result<()> {
        let synced = self.engine.take_synced();
        let (Some(store), Some(data)) = (&self.store, synced.last()) else {
            return Ok(());
        };
        store.save_data(data).await
    }

    fn fill(&mut self, order: &SentOrder) -> Result<()> {
        self.report(order, OrderStatus::AllTraded)?;

        let trade = TradeData {
            vt_tradeid: format!("T{}", self.next_trade_id),
            vt_orderid: order.vt_orderid.clone(),
            vt_symbol: order.vt_symbol.clone(),
            direction: order.order_type.direction(),
            offset: order.order_type.offset(),
            price: order.price,
            volume: order.volume,
            datetime: order.sent_at,
        };
        self.next_trade_id += 1;
        self.fills += 1;
        self.traded_volume += order.volume;

        debug!(order_id = %order.vt_orderid, price = %order.price, volume = %order.volume, "Order filled");
        self.handle.send(StrategyEvent::Trade(trade))
    }

    fn report(&self, order: &SentOrder, status: OrderStatus) -> Result<()> {
        let traded = if status == OrderStatus::AllTraded {
            order.volume
        } else {
            Decimal::ZERO
        };

        self.handle.send(StrategyEvent::Order(OrderData {
            vt_orderid: order.vt_orderid.clone(),
            vt_symbol: order.vt_symbol.clone(),
            direction: order.order_type.direction(),
            offset: order.order_type.offset(),
            price: order.price,
            volume: order.volume,
            traded,
            status,
            datetime: order.sent_at,
        }))
    }
}

fn count_by_type(orders: &[SentOrder]) -> Vec<(CtaOrderType, usize)> {
    [
        CtaOrderType::Buy,
        CtaOrderType::Sell,
        CtaOrderType::Short,
        CtaOrderType::Cover,
    ]
    .into_iter()
    .map(|order_type| {
        let count = orders.iter().filter(|o| o.order_type == order_type).count();
        (order_type, count)
    })
    .collect()
}

/// Replay `events` with `config`.
pub async fn run_replay(config: ReplayConfig, events: &[ReplayEvent]) -> Result<ReplayResults> {
    Replayer::new(config)?.run(events).await
}

/// Replay `events`, continuing from and saving to the strategy's stored data.
pub async fn run_replay_with_store(
    config: ReplayConfig,
    events: &[ReplayEvent],
    store: StrategyStore,
) -> Result<ReplayResults> {
    Replayer::with_store(config, store).await?.run(events).await
}
