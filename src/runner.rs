//! Strategy host: one tokio task per strategy instance.
//!
//! Handles:
//! - Lifecycle transitions (init, start, stop)
//! - Market data and order/trade routing
//! - Position bookkeeping on fills
//! - Publishing and syncing snapshots
//!
//! Every event for an instance goes through one channel and is handled by
//! one task, so callbacks on a strategy never run concurrently.

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{BarData, OrderData, StopOrder, TickData, TradeData};
use crate::strategy::{CtaTemplate, Setting, StrategyData};

/// Command run against the strategy instance inside its task.
pub type Command<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Events delivered to a running strategy.
pub enum StrategyEvent<S> {
    /// Initialize, restoring persisted variables when given.
    Init(Option<Setting>),
    Start,
    Stop,
    Tick(TickData),
    Bar(BarData),
    Order(OrderData),
    Trade(TradeData),
    StopOrder(StopOrder),
    UpdateSetting(Setting),
    Execute(Command<S>),
    Snapshot(oneshot::Sender<StrategyData>),
    Shutdown,
}

/// Owns a strategy instance and applies events to it in order.
pub struct StrategyRunner<S> {
    strategy: S,
    rx: mpsc::UnboundedReceiver<StrategyEvent<S>>,
}

impl<S: CtaTemplate + 'static> StrategyRunner<S> {
    /// Spawn the runner task and return a handle to it.
    pub fn spawn(strategy: S) -> StrategyHandle<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let strategy_name = strategy.ctx().strategy_name().to_string();
        let runner = Self { strategy, rx };
        let task = tokio::spawn(runner.run());

        StrategyHandle {
            strategy_name,
            tx,
            task,
        }
    }

    async fn run(mut self) -> S {
        info!(strategy = %self.strategy.ctx().strategy_name(), "Strategy runner started");

        while let Some(event) = self.rx.recv().await {
            if matches!(event, StrategyEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }

        info!(strategy = %self.strategy.ctx().strategy_name(), "Strategy runner stopped");
        self.strategy
    }

    fn handle(&mut self, event: StrategyEvent<S>) {
        match event {
            StrategyEvent::Init(data) => self.init(data),
            StrategyEvent::Start => self.start(),
            StrategyEvent::Stop => self.stop(),
            StrategyEvent::Tick(tick) => {
                if self.strategy.ctx().inited() {
                    self.strategy.on_tick(&tick);
                }
            }
            StrategyEvent::Bar(bar) => {
                if self.strategy.ctx().inited() {
                    self.strategy.on_bar(&bar);
                }
            }
            StrategyEvent::Order(order) => {
                self.strategy.on_order(&order);
                self.strategy.put_event();
            }
            StrategyEvent::Trade(trade) => {
                self.strategy.ctx_mut().apply_trade(&trade);
                debug!(
                    strategy = %self.strategy.ctx().strategy_name(),
                    order_id = %trade.vt_orderid,
                    pos = %self.strategy.ctx().pos(),
                    "Position updated"
                );
                self.strategy.on_trade(&trade);
                self.sync_and_publish();
            }
            StrategyEvent::StopOrder(stop_order) => self.strategy.on_stop_order(&stop_order),
            StrategyEvent::UpdateSetting(setting) => {
                if let Err(e) = self.strategy.update_setting(&setting) {
                    warn!(
                        strategy = %self.strategy.ctx().strategy_name(),
                        error = %e,
                        "Setting update rejected"
                    );
                }
                self.strategy.put_event();
            }
            StrategyEvent::Execute(command) => command(&mut self.strategy),
            StrategyEvent::Snapshot(reply) => {
                // Receiver gone means the caller stopped waiting.
                let _ = reply.send(self.strategy.get_data());
            }
            StrategyEvent::Shutdown => {}
        }
    }

    fn init(&mut self, data: Option<Setting>) {
        let name = self.strategy.ctx().strategy_name().to_string();
        if self.strategy.ctx().inited() {
            warn!(strategy = %name, "Strategy already initialized");
            return;
        }

        if let Some(data) = data {
            if let Err(e) = self.restore(&data) {
                warn!(strategy = %name, error = %e, "Failed to restore strategy data");
            }
        }

        self.strategy.on_init();
        self.strategy.ctx_mut().mark_inited();
        self.strategy.put_event();
        info!(strategy = %name, "Strategy initialized");
    }

    /// Restore position and variables together, or neither.
    fn restore(&mut self, data: &Setting) -> Result<()> {
        let pos = data
            .get("pos")
            .map(|value| serde_json::from_value::<Decimal>(value.clone()))
            .transpose()
            .context("Invalid persisted pos")?;

        self.strategy.restore_variables(data)?;
        if let Some(pos) = pos {
            self.strategy.ctx_mut().restore_pos(pos);
        }
        Ok(())
    }

    fn start(&mut self) {
        let name = self.strategy.ctx().strategy_name().to_string();
        if !self.strategy.ctx().inited() {
            warn!(strategy = %name, "Strategy not initialized, cannot start");
            return;
        }
        if self.strategy.ctx().trading() {
            warn!(strategy = %name, "Strategy already trading");
            return;
        }

        self.strategy.on_start();
        self.strategy.ctx_mut().set_trading(true);
        self.strategy.put_event();
        info!(strategy = %name, "Strategy started");
    }

    fn stop(&mut self) {
        if !self.strategy.ctx().trading() {
            debug!(strategy = %self.strategy.ctx().strategy_name(), "Strategy not trading, stop ignored");
            return;
        }

        self.strategy.on_stop();
        self.strategy.ctx_mut().set_trading(false);
        self.strategy.ctx().cancel_all();
        self.sync_and_publish();
        info!(strategy = %self.strategy.ctx().strategy_name(), "Strategy stopped");
    }

    fn sync_and_publish(&self) {
        let data = self.strategy.get_data();
        let engine = self.strategy.ctx().engine();
        engine.sync_strategy_data(&data);
        engine.put_strategy_event(&data);
    }
}

/// Sending side of a running strategy.
pub struct StrategyHandle<S> {
    strategy_name: String,
    tx: mpsc::UnboundedSender<StrategyEvent<S>>,
    task: JoinHandle<S>,
}

impl<S: CtaTemplate + 'static> StrategyHandle<S> {
    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Queue an event for the strategy.
    pub fn send(&self, event: StrategyEvent<S>) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("Strategy runner for {} has stopped", self.strategy_name))
    }

    /// Queue a command to run against the strategy instance.
    pub fn execute<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.send(StrategyEvent::Execute(Box::new(command)))
    }

    /// Snapshot taken after every previously queued event is handled.
    pub async fn snapshot(&self) -> Result<StrategyData> {
        let (reply, rx) = oneshot::channel();
        self.send(StrategyEvent::Snapshot(reply))?;
        rx.await
            .with_context(|| format!("Strategy runner for {} dropped snapshot", self.strategy_name))
    }

    /// Stop the runner after queued events and return the strategy.
    pub async fn shutdown(self) -> Result<S> {
        self.send(StrategyEvent::Shutdown)?;
        self.task
            .await
            .with_context(|| format!("Strategy runner for {} panicked", self.strategy_name))
    }
}
