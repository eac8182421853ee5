//! Engine runner - the main trading loop
//!
//! Owns the portfolio, the per-symbol strategy state, and the single tick
//! loop. Phases move `Idle -> Seeding -> Trading -> ShuttingDown ->
//! Terminated`. One task runs the loop, so a cycle can never overlap itself;
//! slow cycles skip the missed ticks instead of bursting to catch up.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::control::EngineCommand;
use crate::events::{EventLog, EventType, TradeEvent};
use crate::executor::TradeExecutor;
use crate::ledger::Portfolio;
use crate::oracle::PriceOracle;
use crate::risk::RiskManager;
use crate::state::{StateStore, Summary};
use crate::strategy::{Strategy, StrategyContext, StrategyState};
use crate::types::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Seeding,
    Trading,
    ShuttingDown,
    Terminated,
}

pub struct Engine {
    config: EngineConfig,
    oracle: PriceOracle,
    executor: TradeExecutor,
    strategy: Box<dyn Strategy>,
    portfolio: Portfolio,
    states: HashMap<String, StrategyState>,
    risk: RiskManager,
    store: StateStore,
    events: EventLog,
    phase: Phase,
    /// (time, realized) per sell, pruned to the trailing 24 hours.
    recent_sells: VecDeque<(DateTime<Utc>, Decimal)>,
    counters_day: NaiveDate,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        oracle: PriceOracle,
        executor: TradeExecutor,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        let store = StateStore::new(&config.data_dir);
        let events = EventLog::new(&config.data_dir);
        let risk = RiskManager::new(config.risk.clone());
        let portfolio = Portfolio::new(config.initial_balance);

        Self {
            config,
            oracle,
            executor,
            strategy,
            portfolio,
            states: HashMap::new(),
            risk,
            store,
            events,
            phase: Phase::Idle,
            recent_sells: VecDeque::new(),
            counters_day: Utc::now().date_naive(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Load persisted holdings, build per-symbol state, back-fill price
    /// history with non-live fetches, and run one trading-disabled warm-up
    /// pass. Safe to call more than once; a second call changes nothing.
    pub async fn seed(&mut self) -> anyhow::Result<()> {
        if self.phase != Phase::Idle {
            debug!("seed skipped: engine already {:?}", self.phase);
            return Ok(());
        }
        self.phase = Phase::Seeding;
        info!(
            "seeding: {} strategy, {} symbols, {} mode",
            self.strategy.name(),
            self.config.symbols.len(),
            if self.executor.is_paper() {
                "paper"
            } else {
                "live"
            }
        );

        self.store.init().await?;
        let holdings = self.store.load_holdings().await?;
        if !holdings.is_empty() {
            info!("restored {} positions from disk", holdings.len());
            self.portfolio.positions = holdings;
        }

        for symbol in &self.config.symbols {
            self.states.entry(symbol.clone()).or_insert_with(|| {
                StrategyState::new(self.config.history_len, self.config.trend_len)
            });
        }

        // Warm-up pass: observe prices and refresh indicators, no trading.
        self.run_cycle(false).await;

        self.phase = Phase::Trading;
        info!("seeding complete, trading enabled");
        Ok(())
    }

    /// Run until a shutdown command arrives.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) -> anyhow::Result<()> {
        self.seed().await?;

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        // A cycle slower than the interval skips the missed ticks; the
        // single-task loop is the in-flight guard.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.phase == Phase::Trading {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(true).await;
                }
                command = commands.recv() => {
                    match command {
                        Some(EngineCommand::Shutdown) | None => {
                            self.phase = Phase::ShuttingDown;
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
            }
        }

        info!("shutting down, persisting final state");
        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, self.persist()).await.is_err() {
            warn!("final persistence exceeded the {:?} grace period", grace);
        }
        self.phase = Phase::Terminated;
        info!("terminated");
        Ok(())
    }

    /// One full cycle: symbols sequentially, then valuation, risk updates,
    /// profit lock, and persistence.
    pub async fn run_cycle(&mut self, trading: bool) {
        self.roll_daily_counters();

        for symbol in self.config.symbols.clone() {
            if let Err(e) = self.process_symbol(&symbol, trading).await {
                // Skip the symbol for this tick, never the whole cycle.
                warn!("{symbol}: cycle error, skipping this tick: {e:#}");
            }
        }

        let marks = self.live_marks();
        let value = self.portfolio.value(&marks);

        if trading && self.portfolio.beginning_value.is_none() {
            self.try_fix_beginning_value(&marks, value);
        }

        let was_braked = self.risk.brake_engaged();
        self.risk.observe_value(value);
        if self.risk.brake_engaged() != was_braked {
            let event = if self.risk.brake_engaged() {
                EventType::BrakeEngaged
            } else {
                EventType::BrakeReleased
            };
            self.events.append(&TradeEvent::new(event)).await;
        }

        if trading {
            if let Some(locked) = self.risk.maybe_lock_profit(&mut self.portfolio, Utc::now()) {
                self.events
                    .append(&TradeEvent::new(EventType::ProfitLock).realized(locked))
                    .await;
            }
        }

        self.persist().await;
    }

    async fn process_symbol(&mut self, symbol: &str, trading: bool) -> anyhow::Result<()> {
        let basis = self.portfolio.position(symbol).map(|p| p.cost_basis);
        // Trading requires a live quote; seeding tolerates fallbacks.
        let Some(quote) = self.oracle.get_price(symbol, trading, basis).await else {
            debug!("{symbol}: no live price, skipping this tick");
            return Ok(());
        };
        if quote.price <= Decimal::ZERO {
            debug!("{symbol}: no usable price yet");
            return Ok(());
        }

        let now = Utc::now();
        let state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| StrategyState::new(self.config.history_len, self.config.trend_len));
        let prev_price = state.last_price;
        state.observe(quote.price, &quote.source, now);
        self.strategy
            .update_state(symbol, state, &self.config.strategy_params);
        state.refresh_indicators(self.config.strategy_params.atr_lookback);

        if !trading || !quote.live {
            return Ok(());
        }

        let position = self.portfolio.position(symbol);
        let ctx = StrategyContext {
            symbol,
            price: quote.price,
            prev_price,
            cost_basis: position.map(|p| p.cost_basis),
            position_amount: position.map(|p| p.amount).unwrap_or(Decimal::ZERO),
            head_lot: position.and_then(|p| p.head_lot().cloned()),
            lowest_lot_price: position.and_then(|p| p.lowest_lot_price()),
            params: &self.config.strategy_params,
            now,
        };

        let state = self
            .states
            .get_mut(symbol)
            .ok_or_else(|| anyhow::anyhow!("missing state for {symbol}"))?;
        let decision = self.strategy.decide(&ctx, state);

        match decision.action {
            TradeAction::Hold => Ok(()),
            TradeAction::Buy => self.execute_buy(symbol, quote.price, decision.reason).await,
            TradeAction::Sell => {
                self.execute_sell(
                    symbol,
                    quote.price,
                    decision.quantity,
                    decision.entry_price,
                    decision.reason,
                )
                .await
            }
        }
    }

    async fn execute_buy(
        &mut self,
        symbol: &str,
        price: Decimal,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        let gate = self.risk.gate_buy();
        if let crate::risk::GateOutcome::Block { reason } = gate {
            info!("{symbol}: buy blocked: {reason}");
            return Ok(());
        }

        // Size against the worst-case fill, not the quote: fills drift
        // adversely by up to the configured slippage, and the ledger must
        // never refuse an order the executor has already completed.
        let sizing_price = price * (Decimal::ONE + self.config.slippage);
        let Some(quantity) = self.portfolio.size_buy(
            sizing_price,
            self.config.buy_cash_fraction,
            self.config.min_trade_usd,
        ) else {
            debug!(
                "{symbol}: buy skipped, cash {} cannot cover the minimum trade",
                self.portfolio.cash
            );
            return Ok(());
        };

        let fill = self
            .executor
            .execute(symbol, TradeAction::Buy, quantity, price)
            .await?;
        self.portfolio.apply_buy(symbol, fill.price, fill.quantity)?;

        self.events
            .append(
                &TradeEvent::new(EventType::Buy)
                    .symbol(symbol)
                    .price(fill.price)
                    .quantity(fill.quantity)
                    .reason(reason.unwrap_or_default()),
            )
            .await;
        Ok(())
    }

    async fn execute_sell(
        &mut self,
        symbol: &str,
        price: Decimal,
        quantity: Option<Decimal>,
        entry_price: Option<Decimal>,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        let Some(position) = self.portfolio.position(symbol) else {
            debug!("{symbol}: sell decision with no position, ignoring");
            return Ok(());
        };
        let quantity = quantity.unwrap_or(position.amount);
        let entry = entry_price.unwrap_or(position.cost_basis);

        let gate = self.risk.gate_sell(
            price,
            entry,
            quantity,
            self.config.slippage,
            self.config.fee,
        );
        if let crate::risk::GateOutcome::Block { reason } = gate {
            info!("{symbol}: sell blocked: {reason}");
            return Ok(());
        }

        let fill = self
            .executor
            .execute(symbol, TradeAction::Sell, quantity, price)
            .await?;
        // Fees come off the fill price; paper slippage is already in it.
        let net_price = fill.price * (Decimal::ONE - self.config.fee);
        let outcome = self.portfolio.apply_sell(
            symbol,
            net_price,
            fill.quantity,
            self.config.min_holding,
        );
        if outcome.quantity <= Decimal::ZERO {
            return Ok(());
        }

        let now = Utc::now();
        self.recent_sells.push_back((now, outcome.realized));

        self.events
            .append(
                &TradeEvent::new(EventType::Sell)
                    .symbol(symbol)
                    .price(net_price)
                    .quantity(outcome.quantity)
                    .realized(outcome.realized)
                    .reason(reason.unwrap_or_default()),
            )
            .await;
        Ok(())
    }

    /// Marks from live-sourced cached quotes only.
    fn live_marks(&self) -> HashMap<String, Decimal> {
        self.config
            .symbols
            .iter()
            .filter_map(|symbol| {
                self.oracle
                    .cached(symbol)
                    .filter(|q| q.live)
                    .map(|q| (symbol.clone(), q.price))
            })
            .collect()
    }

    /// The beginning value is only fixed once every held symbol has a live
    /// mark; until then it stays unset and we retry next cycle.
    fn try_fix_beginning_value(&mut self, marks: &HashMap<String, Decimal>, value: Decimal) {
        let all_marked = self
            .portfolio
            .positions
            .keys()
            .all(|symbol| marks.contains_key(symbol));
        if all_marked {
            self.portfolio.beginning_value = Some(value);
            info!("beginning portfolio value fixed at {}", value);
        } else {
            debug!("beginning value deferred: not all positions have live marks");
        }
    }

    /// Realized profit over the trailing 24 hours.
    fn realized_24h(&mut self) -> Decimal {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        while let Some((time, _)) = self.recent_sells.front() {
            if *time < cutoff {
                self.recent_sells.pop_front();
            } else {
                break;
            }
        }
        self.recent_sells.iter().map(|(_, r)| *r).sum()
    }

    /// Daily counters roll over at UTC midnight.
    fn roll_daily_counters(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.counters_day {
            info!(
                "daily rollover: {} buys, {} sells, {} realized",
                self.portfolio.buys_today, self.portfolio.sells_today, self.portfolio.daily_profit
            );
            self.portfolio.buys_today = 0;
            self.portfolio.sells_today = 0;
            self.portfolio.daily_profit = Decimal::ZERO;
            self.counters_day = today;
        }
    }

    fn build_summary(&mut self) -> Summary {
        let marks = self.live_marks();
        let now = Utc::now();
        Summary {
            generated_at: now,
            started_at: self.portfolio.started_at,
            uptime_secs: (now - self.portfolio.started_at).num_seconds(),
            beginning_value: self.portfolio.beginning_value,
            total_value: self.portfolio.value(&marks),
            cash: self.portfolio.cash,
            locked_cash: self.portfolio.locked_cash,
            market_value: self.portfolio.market_value(&marks),
            buys_today: self.portfolio.buys_today,
            sells_today: self.portfolio.sells_today,
            daily_profit: self.portfolio.daily_profit,
            realized_24h: self.realized_24h(),
        }
    }

    /// Write summary + holdings. Failures are logged and retried next tick.
    async fn persist(&mut self) {
        let summary = self.build_summary();
        if let Err(e) = self.store.write_summary(&summary).await {
            error!("summary write failed (will retry next tick): {e:#}");
        }
        if let Err(e) = self.store.write_holdings(&self.portfolio.positions).await {
            error!("holdings write failed (will retry next tick): {e:#}");
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Status => self.print_status(),
            EngineCommand::DumpGrid => self.print_grid(),
            EngineCommand::Legend => print_legend(),
            // Handled by the run loop before we get here.
            EngineCommand::Shutdown => {}
        }
    }

    fn print_status(&mut self) {
        let summary = self.build_summary();
        info!(
            "STATUS | value {} (cash {} + locked {} + market {}) | today: {} buys / {} sells / {} realized | 24h realized {}",
            summary.total_value,
            summary.cash,
            summary.locked_cash,
            summary.market_value,
            summary.buys_today,
            summary.sells_today,
            summary.daily_profit,
            summary.realized_24h,
        );
        if let Some(beginning) = summary.beginning_value {
            info!(
                "STATUS | since start: {} -> {} ({:+})",
                beginning,
                summary.total_value,
                summary.total_value - beginning
            );
        }
    }

    fn print_grid(&self) {
        if self.portfolio.positions.is_empty() {
            info!("GRID | no open positions");
            return;
        }
        for (symbol, position) in &self.portfolio.positions {
            info!(
                "GRID | {} | amount {} | cost basis {} | {} lots",
                symbol,
                position.amount,
                position.cost_basis,
                position.lots.len()
            );
            for lot in &position.lots {
                info!(
                    "GRID |   {} @ {} ({})",
                    lot.amount,
                    lot.price,
                    lot.time.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
}

fn print_legend() {
    info!("COMMANDS | s = status, g = grid, l = legend, q = quit");
    info!("COMMANDS | signals: SIGUSR1 = status, SIGUSR2 = grid, SIGTERM = quit");
    info!("COMMANDS | sentinel files in the data dir: cmd.status, cmd.grid, cmd.shutdown");
}
