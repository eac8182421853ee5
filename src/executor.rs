//! Trade executor - paper fills or real broker orders
//!
//! Paper mode simulates a market fill at the quoted price with a small random
//! slippage against the taker (buys fill slightly above the quote, sells
//! slightly below). Live mode submits a market order through the broker client
//! and returns the confirmed fill.

use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::broker::BrokerClient;
use crate::types::{Fill, TradeAction};

pub enum TradeExecutor {
    Paper {
        /// Maximum simulated slippage as a fraction of the quote.
        max_slippage: Decimal,
    },
    Live {
        client: BrokerClient,
    },
}

impl TradeExecutor {
    pub fn paper(max_slippage: Decimal) -> Self {
        Self::Paper { max_slippage }
    }

    pub fn live(client: BrokerClient) -> Self {
        Self::Live { client }
    }

    pub fn is_paper(&self) -> bool {
        matches!(self, Self::Paper { .. })
    }

    /// Execute a market order. `quote_price` is the quote the decision was
    /// made against; paper fills derive from it, live fills ignore it.
    pub async fn execute(
        &self,
        symbol: &str,
        side: TradeAction,
        quantity: Decimal,
        quote_price: Decimal,
    ) -> anyhow::Result<Fill> {
        if quantity <= Decimal::ZERO || quote_price <= Decimal::ZERO {
            anyhow::bail!("invalid order: {side} {quantity} {symbol} @ {quote_price}");
        }

        match self {
            Self::Paper { max_slippage } => {
                let fill_price = simulate_fill_price(quote_price, *max_slippage, side);
                let fill = Fill {
                    price: fill_price,
                    quantity,
                    order_id: Some(format!("paper-{}", Uuid::new_v4())),
                };
                debug!(
                    "paper fill: {} {} {} @ {} (quote {})",
                    side, quantity, symbol, fill.price, quote_price
                );
                Ok(fill)
            }
            Self::Live { client } => client.submit_market_order(symbol, side, quantity).await,
        }
    }
}

/// Quote price nudged against the taker by a random fraction of the
/// configured slippage. Holds map to the quote unchanged.
fn simulate_fill_price(quote: Decimal, max_slippage: Decimal, side: TradeAction) -> Decimal {
    let jitter_frac = rand::thread_rng().gen_range(0.0..=1.0);
    let jitter = quote
        * max_slippage
        * Decimal::from_f64(jitter_frac).unwrap_or(Decimal::ONE);
    match side {
        TradeAction::Buy => quote + jitter,
        TradeAction::Sell => quote - jitter,
        TradeAction::Hold => quote,
    }
}
