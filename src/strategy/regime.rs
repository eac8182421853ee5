//! Regime-switching strategy
//!
//! Uses the shared SMA-50/200 regime classifier and adjusts the grid
//! thresholds per regime: pullback buys with wider profit targets in an
//! uptrend, no new buys and quick exits in a downtrend, base thresholds
//! when rangebound.

use rust_decimal::Decimal;

use super::threshold::grid_decide;
use super::{Decision, Regime, Strategy, StrategyContext, StrategyState};

pub struct RegimeStrategy;

impl Strategy for RegimeStrategy {
    fn name(&self) -> &'static str {
        "regime"
    }

    fn decide(&self, ctx: &StrategyContext, state: &mut StrategyState) -> Decision {
        let (buy_dip, sell_rise, allow_buys) = match state.regime {
            // Let winners run, buy shallow pullbacks.
            Regime::Uptrend => (
                ctx.params.buy_dip,
                ctx.params.sell_rise * Decimal::new(15, 1), // 1.5x
                true,
            ),
            // No fresh exposure; take profit at half the usual rise.
            Regime::Downtrend => (
                ctx.params.buy_dip,
                ctx.params.sell_rise * Decimal::new(5, 1), // 0.5x
                false,
            ),
            Regime::Rangebound => (ctx.params.buy_dip, ctx.params.sell_rise, true),
        };

        let mut decision = grid_decide(ctx, state, buy_dip, sell_rise, allow_buys);
        if let Some(reason) = decision.reason.as_mut() {
            reason.push_str(&format!(" [{:?}]", state.regime));
        }
        decision
    }
}
