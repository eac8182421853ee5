//! Core types shared across the trading engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price quote for a symbol, tagged with its source and fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    /// Provider that produced this quote ("broker", "binance", "fallback", ...)
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// False when the price was synthesized from cache or cost basis.
    pub live: bool,
}

impl Quote {
    /// Age of the quote relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// Trade action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
            TradeAction::Hold => write!(f, "hold"),
        }
    }
}

/// Tick-to-tick price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// A fill returned by the executor (simulated or live).
#[derive(Debug, Clone)]
pub struct Fill {
    pub price: Decimal,
    pub quantity: Decimal,
    /// Broker order id when the fill came from a real order.
    pub order_id: Option<String>,
}
