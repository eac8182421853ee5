//! Risk manager - drawdown brake, profit gate, profit locking
//!
//! Sits between strategy decisions and the executor. The brake tracks the
//! portfolio's running all-time-high and blocks new buys during deep
//! drawdowns, releasing only after a recovery (hysteresis, so it does not
//! flap around the threshold). The sell gate enforces a minimum net profit
//! after slippage and fees. Profit locking periodically sweeps a fraction of
//! the day's realized profit into a reserve that buys can never spend.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::ledger::Portfolio;

/// Verdict from a risk gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allow,
    Block { reason: String },
}

impl GateOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allow)
    }
}

pub struct RiskManager {
    config: RiskConfig,
    /// Running all-time-high of total portfolio value.
    ath: Decimal,
    brake_engaged: bool,
    last_lock: Option<DateTime<Utc>>,
    /// Day of the last scheduled-hour sweep, when `lock_hour_utc` is set.
    last_lock_day: Option<NaiveDate>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            ath: Decimal::ZERO,
            brake_engaged: false,
            last_lock: None,
            last_lock_day: None,
        }
    }

    pub fn brake_engaged(&self) -> bool {
        self.brake_engaged
    }

    pub fn ath(&self) -> Decimal {
        self.ath
    }

    /// Feed the latest total portfolio value. Engages the brake once the
    /// drawdown from ATH reaches the brake threshold; releases it only after
    /// recovering above the (tighter) release threshold.
    pub fn observe_value(&mut self, value: Decimal) {
        if value > self.ath {
            self.ath = value;
        }
        if self.ath <= Decimal::ZERO {
            return;
        }

        let drawdown = (self.ath - value) / self.ath;
        if !self.brake_engaged && drawdown >= self.config.brake_drawdown {
            warn!(
                "drawdown brake ENGAGED: value {} is {:.2}% below ATH {}",
                value,
                drawdown * Decimal::from(100),
                self.ath
            );
            self.brake_engaged = true;
        } else if self.brake_engaged && drawdown <= self.config.release_drawdown {
            info!(
                "drawdown brake released: value {} recovered to within {:.2}% of ATH {}",
                value,
                drawdown * Decimal::from(100),
                self.ath
            );
            self.brake_engaged = false;
        }
    }

    /// Buys are blocked while the drawdown brake is engaged. Sells are never
    /// brake-gated; reducing exposure during a drawdown is the point.
    pub fn gate_buy(&self) -> GateOutcome {
        if self.brake_engaged {
            GateOutcome::Block {
                reason: "drawdown brake engaged".to_string(),
            }
        } else {
            GateOutcome::Allow
        }
    }

    /// A sell passes only if it nets more than the configured minimum profit
    /// after slippage and fees:
    /// `(price * (1 - slippage - fee) - entry) * quantity > min_profit_usd`.
    pub fn gate_sell(
        &self,
        price: Decimal,
        entry: Decimal,
        quantity: Decimal,
        slippage: Decimal,
        fee: Decimal,
    ) -> GateOutcome {
        let net_price = price * (Decimal::ONE - slippage - fee);
        let net_profit = (net_price - entry) * quantity;
        if net_profit > self.config.min_profit_usd {
            GateOutcome::Allow
        } else {
            GateOutcome::Block {
                reason: format!(
                    "net profit {} below minimum {} (net price {}, entry {})",
                    net_profit, self.config.min_profit_usd, net_price, entry
                ),
            }
        }
    }

    /// Sweep a fraction of the day's realized profit into the locked reserve.
    ///
    /// Triggers when `daily_profit` reaches the configured amount, subject to
    /// the minimum interval between sweeps; with `lock_hour_utc` set, at most
    /// one sweep per day, during that hour. The locked amount comes only out
    /// of realized profit, never out of initial capital, and is additionally
    /// capped by available cash. Returns the amount locked, if any.
    pub fn maybe_lock_profit(
        &mut self,
        portfolio: &mut Portfolio,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        if portfolio.daily_profit < self.config.lock_trigger_usd {
            return None;
        }

        if let Some(hour) = self.config.lock_hour_utc {
            if now.hour() != hour {
                return None;
            }
            if self.last_lock_day == Some(now.date_naive()) {
                return None;
            }
        }
        if let Some(last) = self.last_lock {
            if (now - last).num_seconds() < self.config.lock_min_interval_secs {
                debug!("profit lock skipped: inside the minimum interval");
                return None;
            }
        }

        let lock = (portfolio.daily_profit * self.config.lock_fraction).min(portfolio.cash);
        if lock <= Decimal::ZERO {
            return None;
        }

        portfolio.cash -= lock;
        portfolio.locked_cash += lock;
        portfolio.daily_profit -= lock;
        self.last_lock = Some(now);
        self.last_lock_day = Some(now.date_naive());

        info!(
            "profit lock: swept {} into reserve (locked total {}, cash {})",
            lock, portfolio.locked_cash, portfolio.cash
        );
        Some(lock)
    }
}
