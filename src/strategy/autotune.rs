//! Self-tuning threshold strategy
//!
//! Runs the fixed grid logic but adjusts its own thresholds from a rolling
//! win-rate: mostly-losing windows widen the band (trade less, demand more),
//! mostly-winning windows tighten it. Tuned values live in the per-symbol
//! scratch state, so symbols tune independently and tuning does not survive
//! a restart.

use rust_decimal::Decimal;

use super::threshold::grid_decide;
use super::{Decision, Strategy, StrategyContext, StrategyState};
use crate::types::TradeAction;

pub struct AutoTuneStrategy;

/// Rolling outcome window used for the win-rate.
const OUTCOME_WINDOW: usize = 20;

/// Win-rate bounds that trigger an adjustment.
const LOW_WIN_RATE: f64 = 0.4;
const HIGH_WIN_RATE: f64 = 0.6;

fn clamp_threshold(value: Decimal) -> Decimal {
    let floor = Decimal::new(2, 3); // 0.2%
    let ceiling = Decimal::new(1, 1); // 10%
    value.max(floor).min(ceiling)
}

impl AutoTuneStrategy {
    fn retune(state: &mut StrategyState, buy_dip: Decimal, sell_rise: Decimal) {
        let outcomes = &state.scratch.outcomes;
        if outcomes.is_empty() {
            return;
        }
        let wins = outcomes.iter().filter(|w| **w).count() as f64;
        let win_rate = wins / outcomes.len() as f64;

        let (new_buy, new_sell) = if win_rate < LOW_WIN_RATE {
            // Losing too often: widen both thresholds 10%.
            (
                buy_dip * Decimal::new(11, 1),
                sell_rise * Decimal::new(11, 1),
            )
        } else if win_rate > HIGH_WIN_RATE {
            // Winning comfortably: tighten 5% to trade more.
            (
                buy_dip * Decimal::new(95, 2),
                sell_rise * Decimal::new(95, 2),
            )
        } else {
            return;
        };

        state.scratch.tuned_buy_dip = Some(clamp_threshold(new_buy));
        state.scratch.tuned_sell_rise = Some(clamp_threshold(new_sell));
    }
}

impl Strategy for AutoTuneStrategy {
    fn name(&self) -> &'static str {
        "autotune"
    }

    fn decide(&self, ctx: &StrategyContext, state: &mut StrategyState) -> Decision {
        let buy_dip = state.scratch.tuned_buy_dip.unwrap_or(ctx.params.buy_dip);
        let sell_rise = state
            .scratch
            .tuned_sell_rise
            .unwrap_or(ctx.params.sell_rise);

        let decision = grid_decide(ctx, state, buy_dip, sell_rise, true);

        if decision.action == TradeAction::Sell {
            let win = decision
                .realized_hint
                .map(|p| p > Decimal::ZERO)
                .unwrap_or(false);
            state.scratch.outcomes.push_back(win);
            while state.scratch.outcomes.len() > OUTCOME_WINDOW {
                state.scratch.outcomes.pop_front();
            }
            state.scratch.sells_since_tune += 1;
            if state.scratch.sells_since_tune >= ctx.params.tune_every {
                state.scratch.sells_since_tune = 0;
                Self::retune(state, buy_dip, sell_rise);
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyParams;
    use crate::ledger::Lot;
    use chrono::Utc;

    fn params() -> StrategyParams {
        StrategyParams {
            buy_dip: Decimal::new(2, 2),
            sell_rise: Decimal::new(2, 2),
            cooldown_secs: 0,
            atr_lookback: 3,
            atr_grid_mult: Decimal::from(2),
            confirm_n: 2,
            confirm_m: 3,
            tune_every: 2,
        }
    }

    fn sell_ctx(params: &StrategyParams, price: i64, lot_price: i64) -> StrategyContext<'_> {
        let lot = Lot {
            price: Decimal::from(lot_price),
            amount: Decimal::ONE,
            time: Utc::now(),
        };
        StrategyContext {
            symbol: "BTCUSD",
            price: Decimal::from(price),
            prev_price: None,
            cost_basis: Some(lot.price),
            position_amount: lot.amount,
            lowest_lot_price: Some(lot.price),
            head_lot: Some(lot),
            params,
            now: Utc::now(),
        }
    }

    #[test]
    fn winning_streak_tightens_thresholds() {
        let params = params();
        let mut state = StrategyState::new(50, 10);

        // Two profitable sells with tune_every = 2 trigger a retune.
        for _ in 0..2 {
            let ctx = sell_ctx(&params, 103, 100);
            let decision = AutoTuneStrategy.decide(&ctx, &mut state);
            assert_eq!(decision.action, TradeAction::Sell);
        }

        let tuned = state.scratch.tuned_sell_rise.unwrap();
        assert!(tuned < params.sell_rise);
        // 2% * 0.95
        assert_eq!(tuned, Decimal::new(19, 3));
    }

    #[test]
    fn tuned_thresholds_are_clamped() {
        let mut state = StrategyState::new(50, 10);
        // All-losing window forces a widen.
        for _ in 0..3 {
            state.scratch.outcomes.push_back(false);
        }
        AutoTuneStrategy::retune(&mut state, Decimal::new(9, 2), Decimal::new(99, 3));

        // Widening 10% from 9.9% would exceed the 10% ceiling.
        assert_eq!(state.scratch.tuned_buy_dip.unwrap(), Decimal::new(99, 3));
        assert!(state.scratch.tuned_sell_rise.unwrap() <= Decimal::new(1, 1));
    }

    #[test]
    fn uses_tuned_thresholds_once_set() {
        let params = params();
        let mut state = StrategyState::new(50, 10);
        // Tighten the sell target to 1%.
        state.scratch.tuned_sell_rise = Some(Decimal::new(1, 2));

        // +1.5% clears the tuned 1% target but not the base 2%.
        let ctx = sell_ctx(&params, 1015, 1000);
        let decision = AutoTuneStrategy.decide(&ctx, &mut state);
        assert_eq!(decision.action, TradeAction::Sell);
    }
}
