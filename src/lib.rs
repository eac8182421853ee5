//! Grid Runner Library
//!
//! Grid-trading engine for spot crypto symbols: multi-provider price oracle,
//! cost-basis lot ledger, pluggable strategies, risk gating with profit
//! locking, and file-based state for external consumers.

pub mod broker;
pub mod config;
pub mod control;
pub mod events;
pub mod executor;
pub mod ledger;
pub mod oracle;
pub mod providers;
pub mod risk;
pub mod runner;
pub mod session;
pub mod state;
pub mod strategy;
pub mod types;

// Re-export main types for convenience
pub use broker::BrokerClient;
pub use config::{BrokerConfig, EngineConfig, RiskConfig, StrategyParams, TradingMode};
pub use control::{spawn_command_sources, EngineCommand};
pub use events::{EventLog, EventType, TradeEvent};
pub use executor::TradeExecutor;
pub use ledger::{LedgerError, Lot, Portfolio, Position, SellOutcome};
pub use oracle::PriceOracle;
pub use providers::{PriceProvider, ProviderError, ProviderKind};
pub use risk::{GateOutcome, RiskManager};
pub use runner::{Engine, Phase};
pub use session::SessionProvider;
pub use state::{StateStore, Summary};
pub use strategy::{
    Decision, Strategy, StrategyContext, StrategyRegistry, StrategyState, DEFAULT_STRATEGY,
};
pub use types::{Fill, Quote, TradeAction, Trend};
