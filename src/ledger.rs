//! Grid ledger - lots, positions, and cash balances
//!
//! The only component allowed to mutate portfolio balances. Buys append
//! cost-basis lots; sells consume them oldest-first. Every operation keeps
//! the lot-conservation and no-negative-balance invariants.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient cash: need {needed}, have {available}")]
    InsufficientCash { needed: Decimal, available: Decimal },

    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

/// A single buy-priced slice of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub price: Decimal,
    pub amount: Decimal,
    pub time: DateTime<Utc>,
}

/// One actively-held symbol.
///
/// Serialized form matches the holdings file:
/// `{amount, cost_basis, grid: [{price, amount, time}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub amount: Decimal,
    /// Price of the oldest unconsumed lot.
    pub cost_basis: Decimal,
    #[serde(rename = "grid")]
    pub lots: VecDeque<Lot>,
}

impl Position {
    /// Oldest unconsumed lot.
    pub fn head_lot(&self) -> Option<&Lot> {
        self.lots.front()
    }

    /// Lowest lot entry price, used by grid strategies to buy descending levels.
    pub fn lowest_lot_price(&self) -> Option<Decimal> {
        self.lots.iter().map(|l| l.price).min()
    }

    /// Sum of lot amounts; must always equal `amount`.
    pub fn lots_total(&self) -> Decimal {
        self.lots.iter().map(|l| l.amount).sum()
    }
}

/// Result of a sell against the ledger.
#[derive(Debug, Clone, Copy)]
pub struct SellOutcome {
    /// Quantity actually removed from lots (may exceed the request when a
    /// dust remainder was swept, or fall short when lots ran out).
    pub quantity: Decimal,
    /// Realized profit vs the consumed entry price.
    pub realized: Decimal,
    /// Cash credited.
    pub proceeds: Decimal,
}

/// Portfolio state: cash, locked cash, and per-symbol positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    /// Spendable balance.
    pub cash: Decimal,
    /// Realized-profit reserve; never spent on new buys.
    pub locked_cash: Decimal,
    pub positions: HashMap<String, Position>,
    pub buys_today: u32,
    pub sells_today: u32,
    /// Realized sell profit accumulated today, reduced by profit locks.
    pub daily_profit: Decimal,
    pub started_at: DateTime<Utc>,
    /// Computed once after seeding, from fresh-only marks.
    pub beginning_value: Option<Decimal>,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            locked_cash: Decimal::ZERO,
            positions: HashMap::new(),
            buys_today: 0,
            sells_today: 0,
            daily_profit: Decimal::ZERO,
            started_at: Utc::now(),
            beginning_value: None,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Buy sizing policy: spend the larger of `cash * fraction` and the
    /// minimum notional; reject outright if that exceeds available cash.
    pub fn size_buy(
        &self,
        price: Decimal,
        cash_fraction: Decimal,
        min_notional: Decimal,
    ) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }
        let spend = (self.cash * cash_fraction).max(min_notional);
        if spend > self.cash || spend <= Decimal::ZERO {
            return None;
        }
        Some(spend / price)
    }

    /// Debit cash and append a lot.
    pub fn apply_buy(
        &mut self,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), LedgerError> {
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "buy {symbol}: price={price} qty={quantity}"
            )));
        }
        let cost = price * quantity;
        if cost > self.cash {
            return Err(LedgerError::InsufficientCash {
                needed: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        let position = self.positions.entry(symbol.to_string()).or_default();
        position.amount += quantity;
        position.lots.push_back(Lot {
            price,
            amount: quantity,
            time: Utc::now(),
        });
        // Cost basis tracks the oldest unconsumed lot.
        if let Some(head) = position.lots.front() {
            position.cost_basis = head.price;
        }
        self.buys_today += 1;

        info!(
            "BUY {} | qty {} @ {} | spent {} | cash {}",
            symbol, quantity, price, cost, self.cash
        );
        Ok(())
    }

    /// Consume lots oldest-first and credit proceeds.
    ///
    /// `price` is the net execution price (slippage/fees already applied by
    /// the caller). A sell with no lots is a zero no-op, signaling "nothing
    /// to sell". A head-lot remainder below `min_holding` is swept into the
    /// sale rather than left as dust.
    pub fn apply_sell(
        &mut self,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
        min_holding: Decimal,
    ) -> SellOutcome {
        let none = SellOutcome {
            quantity: Decimal::ZERO,
            realized: Decimal::ZERO,
            proceeds: Decimal::ZERO,
        };
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            warn!("SELL {} rejected: price={} qty={}", symbol, price, quantity);
            return none;
        }
        let Some(position) = self.positions.get_mut(symbol) else {
            debug!("SELL {}: no position, nothing to sell", symbol);
            return none;
        };
        if position.lots.is_empty() || position.amount <= Decimal::ZERO {
            debug!("SELL {}: no lots, nothing to sell", symbol);
            return none;
        }

        let mut remaining = quantity.min(position.amount);
        let mut sold = Decimal::ZERO;
        let mut realized = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            let Some(head) = position.lots.front_mut() else {
                break;
            };
            let mut take = remaining.min(head.amount);
            // Sweep a dust remainder instead of leaving it in the lot.
            if head.amount - take < min_holding {
                take = head.amount;
            }
            realized += (price - head.price) * take;
            sold += take;
            remaining -= remaining.min(take);
            head.amount -= take;
            if head.amount <= Decimal::ZERO {
                position.lots.pop_front();
            }
        }

        position.amount -= sold;
        if position.amount < Decimal::ZERO {
            position.amount = Decimal::ZERO;
        }
        if let Some(head) = position.lots.front() {
            position.cost_basis = head.price;
        }
        if position.amount < min_holding {
            self.positions.remove(symbol);
        }

        let proceeds = price * sold;
        self.cash += proceeds;
        self.daily_profit += realized;
        self.sells_today += 1;

        info!(
            "SELL {} | qty {} @ {} | proceeds {} | realized {} | cash {}",
            symbol, sold, price, proceeds, realized, self.cash
        );

        SellOutcome {
            quantity: sold,
            realized,
            proceeds,
        }
    }

    /// Portfolio value given per-symbol marks: cash + locked + market value.
    /// Positions without a mark are valued at cost basis.
    pub fn value(&self, marks: &HashMap<String, Decimal>) -> Decimal {
        let market: Decimal = self
            .positions
            .iter()
            .map(|(symbol, p)| {
                let mark = marks.get(symbol).copied().unwrap_or(p.cost_basis);
                p.amount * mark
            })
            .sum();
        self.cash + self.locked_cash + market
    }

    /// Market value of positions only.
    pub fn market_value(&self, marks: &HashMap<String, Decimal>) -> Decimal {
        self.value(marks) - self.cash - self.locked_cash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_hold() -> Decimal {
        Decimal::new(1, 6)
    }

    #[test]
    fn buy_sizes_and_debits_cash() {
        // Scenario: cash=$1000, BUY at $50,000 sizes a $100 spend.
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        let qty = portfolio
            .size_buy(Decimal::from(50_000), Decimal::new(1, 1), Decimal::from(10))
            .unwrap();
        assert_eq!(qty, Decimal::new(2, 3)); // 0.002

        portfolio
            .apply_buy("BTCUSD", Decimal::from(50_000), qty)
            .unwrap();
        assert_eq!(portfolio.cash, Decimal::from(900));
        let pos = portfolio.position("BTCUSD").unwrap();
        assert_eq!(pos.amount, Decimal::new(2, 3));
        assert_eq!(pos.lots.len(), 1);
        assert_eq!(pos.cost_basis, Decimal::from(50_000));
    }

    #[test]
    fn full_sell_realizes_profit_and_clears_position() {
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        portfolio
            .apply_buy("BTCUSD", Decimal::from(50_000), Decimal::new(2, 3))
            .unwrap();

        // Sell the full 0.002 at $51,000, no slippage.
        let outcome = portfolio.apply_sell(
            "BTCUSD",
            Decimal::from(51_000),
            Decimal::new(2, 3),
            min_hold(),
        );
        assert_eq!(outcome.realized, Decimal::from(2));
        assert_eq!(outcome.proceeds, Decimal::from(102));
        assert_eq!(portfolio.cash, Decimal::from(1002));
        assert!(portfolio.position("BTCUSD").is_none());
    }

    #[test]
    fn sells_consume_oldest_lot_first() {
        let mut portfolio = Portfolio::new(Decimal::from(10_000));
        portfolio
            .apply_buy("ETHUSD", Decimal::from(2000), Decimal::ONE)
            .unwrap();
        portfolio
            .apply_buy("ETHUSD", Decimal::from(1800), Decimal::ONE)
            .unwrap();

        // Partial sell consumes half of the oldest (2000) lot.
        let outcome = portfolio.apply_sell(
            "ETHUSD",
            Decimal::from(2100),
            Decimal::new(5, 1),
            min_hold(),
        );
        assert_eq!(outcome.realized, Decimal::from(50)); // (2100-2000)*0.5

        let pos = portfolio.position("ETHUSD").unwrap();
        assert_eq!(pos.lots.len(), 2);
        assert_eq!(pos.head_lot().unwrap().amount, Decimal::new(5, 1));
        assert_eq!(pos.cost_basis, Decimal::from(2000));

        // Selling past the head lot rolls cost basis to the next lot.
        portfolio.apply_sell("ETHUSD", Decimal::from(2100), Decimal::new(5, 1), min_hold());
        let pos = portfolio.position("ETHUSD").unwrap();
        assert_eq!(pos.lots.len(), 1);
        assert_eq!(pos.cost_basis, Decimal::from(1800));
    }

    #[test]
    fn sell_with_no_lots_is_a_noop() {
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        let outcome =
            portfolio.apply_sell("BTCUSD", Decimal::from(50_000), Decimal::ONE, min_hold());
        assert_eq!(outcome.quantity, Decimal::ZERO);
        assert_eq!(outcome.realized, Decimal::ZERO);
        assert_eq!(portfolio.cash, Decimal::from(1000));
    }

    #[test]
    fn buy_never_drives_cash_negative() {
        let mut portfolio = Portfolio::new(Decimal::from(100));
        let err = portfolio
            .apply_buy("BTCUSD", Decimal::from(50_000), Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCash { .. }));
        assert_eq!(portfolio.cash, Decimal::from(100));
        assert!(portfolio.position("BTCUSD").is_none());
    }

    #[test]
    fn oversized_sell_is_clamped_to_position() {
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        portfolio
            .apply_buy("BTCUSD", Decimal::from(100), Decimal::ONE)
            .unwrap();
        let outcome =
            portfolio.apply_sell("BTCUSD", Decimal::from(110), Decimal::from(5), min_hold());
        assert_eq!(outcome.quantity, Decimal::ONE);
        assert!(portfolio.position("BTCUSD").is_none());
    }

    #[test]
    fn dust_remainder_is_swept() {
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        portfolio
            .apply_buy("BTCUSD", Decimal::from(100), Decimal::ONE)
            .unwrap();
        // Leave less than min_holding in the head lot -> whole lot consumed.
        let just_under_full = Decimal::ONE - Decimal::new(1, 7);
        let outcome =
            portfolio.apply_sell("BTCUSD", Decimal::from(110), just_under_full, min_hold());
        assert_eq!(outcome.quantity, Decimal::ONE);
        assert!(portfolio.position("BTCUSD").is_none());
    }

    #[test]
    fn lot_conservation_under_interleavings() {
        // Deterministic pseudo-random interleaving of buys and sells; the
        // lot-sum invariant and non-negative balances must hold throughout.
        let mut portfolio = Portfolio::new(Decimal::from(10_000));
        let mut seed: u64 = 0x9E37_79B9;

        for step in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let price = Decimal::from(50 + (seed >> 33) % 100);
            if seed % 3 == 0 {
                let qty = Decimal::new(((seed >> 17) % 900 + 100) as i64, 3);
                let _ = portfolio.apply_buy("BTCUSD", price, qty);
            } else {
                let qty = Decimal::new(((seed >> 21) % 1500 + 1) as i64, 3);
                portfolio.apply_sell("BTCUSD", price, qty, min_hold());
            }

            assert!(portfolio.cash >= Decimal::ZERO, "cash negative at {step}");
            if let Some(pos) = portfolio.position("BTCUSD") {
                assert!(pos.amount >= Decimal::ZERO);
                assert_eq!(pos.lots_total(), pos.amount, "lot sum broken at {step}");
            }
        }
    }

    #[test]
    fn holdings_serialization_shape() {
        let mut portfolio = Portfolio::new(Decimal::from(1000));
        portfolio
            .apply_buy("BTCUSD", Decimal::from(100), Decimal::ONE)
            .unwrap();
        let json = serde_json::to_value(portfolio.position("BTCUSD").unwrap()).unwrap();
        assert!(json.get("grid").unwrap().is_array());
        assert!(json.get("cost_basis").is_some());
    }
}
