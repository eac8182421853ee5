//! Strategy system - pluggable decision modules
//!
//! A strategy is anything implementing the two-method contract below:
//! an optional per-tick state hook and a decision function. The engine treats
//! every variant identically through the registry; nothing special-cases a
//! concrete strategy.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::StrategyParams;
use crate::ledger::Lot;
use crate::types::{TradeAction, Trend};

pub mod atr_grid;
pub mod autotune;
pub mod indicators;
pub mod regime;
pub mod threshold;

pub use atr_grid::AtrGridStrategy;
pub use autotune::AutoTuneStrategy;
pub use regime::RegimeStrategy;
pub use threshold::ThresholdStrategy;

/// Default registry selection when `STRATEGY` is unset.
pub const DEFAULT_STRATEGY: &str = "threshold";

/// Market regime label from the shared classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Regime {
    /// Also the documented startup bias below 201 points of history.
    #[default]
    Uptrend,
    Downtrend,
    Rangebound,
}

/// Strategy-private scratch fields, carried per symbol.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    /// Last decision time/price, for cooldown logic.
    pub last_action_time: Option<DateTime<Utc>>,
    pub last_action_price: Option<Decimal>,
    /// Auto-tuned thresholds (None until the tuner first adjusts).
    pub tuned_buy_dip: Option<Decimal>,
    pub tuned_sell_rise: Option<Decimal>,
    /// Recent sell outcomes (true = profitable) for win-rate tuning.
    pub outcomes: VecDeque<bool>,
    pub sells_since_tune: u32,
}

/// Per-symbol rolling state, owned by the engine, mutated every tick before
/// the decision call. Never shared across symbols.
#[derive(Debug, Clone)]
pub struct StrategyState {
    history_len: usize,
    trend_len: usize,
    pub prices: VecDeque<Decimal>,
    pub trends: VecDeque<Trend>,
    pub last_price: Option<Decimal>,
    pub last_source: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub atr: Option<Decimal>,
    /// SMA-50
    pub sma_fast: Option<Decimal>,
    /// SMA-200
    pub sma_slow: Option<Decimal>,
    pub regime: Regime,
    pub scratch: Scratch,
}

impl StrategyState {
    pub fn new(history_len: usize, trend_len: usize) -> Self {
        Self {
            history_len: history_len.max(1),
            trend_len: trend_len.max(1),
            prices: VecDeque::new(),
            trends: VecDeque::new(),
            last_price: None,
            last_source: None,
            last_update: None,
            atr: None,
            sma_fast: None,
            sma_slow: None,
            regime: Regime::default(),
            scratch: Scratch::default(),
        }
    }

    /// Record a fetched price: append to the bounded history, derive the
    /// tick-to-tick trend, remember source and time.
    pub fn observe(&mut self, price: Decimal, source: &str, at: DateTime<Utc>) {
        if let Some(prev) = self.last_price {
            let trend = if price > prev {
                Trend::Up
            } else if price < prev {
                Trend::Down
            } else {
                Trend::Flat
            };
            self.trends.push_back(trend);
            while self.trends.len() > self.trend_len {
                self.trends.pop_front();
            }
        }

        self.prices.push_back(price);
        while self.prices.len() > self.history_len {
            self.prices.pop_front();
        }

        self.last_price = Some(price);
        self.last_source = Some(source.to_string());
        self.last_update = Some(at);
    }

    /// Recompute the shared indicators (ATR, SMAs, regime) from history.
    pub fn refresh_indicators(&mut self, atr_lookback: usize) {
        self.atr = indicators::atr(&self.prices, atr_lookback);
        self.sma_fast = indicators::sma(&self.prices, 50);
        self.sma_slow = indicators::sma(&self.prices, 200);
        if let Some(price) = self.last_price {
            self.regime = indicators::classify_regime(
                price,
                self.prices.len(),
                self.sma_fast,
                self.sma_slow,
                &self.trends,
            );
        }
    }

    /// Highest price in the rolling window; anchor for flat-position buys.
    pub fn rolling_max(&self) -> Option<Decimal> {
        self.prices.iter().copied().max()
    }

    /// True while the per-symbol trade cooldown is running.
    pub fn cooldown_active(&self, now: DateTime<Utc>, cooldown_secs: i64) -> bool {
        self.scratch
            .last_action_time
            .map(|t| (now - t).num_seconds() < cooldown_secs)
            .unwrap_or(false)
    }

    /// Mark a buy/sell decision for cooldown tracking.
    pub fn mark_action(&mut self, now: DateTime<Utc>, price: Decimal) {
        self.scratch.last_action_time = Some(now);
        self.scratch.last_action_price = Some(price);
    }
}

/// A strategy's verdict for one symbol on one tick. Ephemeral.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: TradeAction,
    /// Explicit quantity; the runner falls back to its sizing policy (buys)
    /// or the full position (sells) when absent.
    pub quantity: Option<Decimal>,
    /// Entry price of the lot this sell is closing.
    pub entry_price: Option<Decimal>,
    pub reason: Option<String>,
    /// Gross profit the strategy computed for the lot it is closing. Fed
    /// back into strategy scratch (the self-tuner's win/loss window); the
    /// risk gate derives its own net figure from the entry price.
    pub realized_hint: Option<Decimal>,
}

impl Decision {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            quantity: None,
            entry_price: None,
            reason: None,
            realized_hint: None,
        }
    }

    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Buy,
            quantity: None,
            entry_price: None,
            reason: Some(reason.into()),
            realized_hint: None,
        }
    }

    pub fn sell(quantity: Decimal, entry_price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Sell,
            quantity: Some(quantity),
            entry_price: Some(entry_price),
            reason: Some(reason.into()),
            realized_hint: None,
        }
    }

    pub fn with_realized_hint(mut self, hint: Decimal) -> Self {
        self.realized_hint = Some(hint);
        self
    }

    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }
}

/// Decision inputs for one symbol on one tick.
#[derive(Debug)]
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub price: Decimal,
    pub prev_price: Option<Decimal>,
    /// Oldest unconsumed lot's price, if a position exists.
    pub cost_basis: Option<Decimal>,
    pub position_amount: Decimal,
    /// Oldest unconsumed lot (sell target for grid strategies).
    pub head_lot: Option<Lot>,
    /// Lowest lot entry (next buy level for grid strategies).
    pub lowest_lot_price: Option<Decimal>,
    pub params: &'a StrategyParams,
    pub now: DateTime<Utc>,
}

/// The two-method strategy contract.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Optional hook run after every price observation, before `decide`.
    fn update_state(&self, _symbol: &str, _state: &mut StrategyState, _params: &StrategyParams) {}

    /// Produce a decision for the current tick.
    fn decide(&self, ctx: &StrategyContext, state: &mut StrategyState) -> Decision;
}

/// Startup-time registry mapping strategy names to implementations.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Registry with all built-in strategies.
    pub fn with_builtins() -> Self {
        let mut strategies: HashMap<&'static str, Box<dyn Strategy>> = HashMap::new();
        for strategy in [
            Box::new(ThresholdStrategy) as Box<dyn Strategy>,
            Box::new(RegimeStrategy),
            Box::new(AtrGridStrategy),
            Box::new(AutoTuneStrategy),
        ] {
            strategies.insert(strategy.name(), strategy);
        }
        Self { strategies }
    }

    /// Remove a strategy by name, transferring ownership to the engine.
    pub fn take(&mut self, name: &str) -> Option<Box<dyn Strategy>> {
        self.strategies.remove(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
