//! ATR-adaptive grid strategy
//!
//! Grid spacing scales with recent volatility: buy a level once price has
//! fallen one ATR-multiple below the lowest held lot (or the rolling high
//! when flat), sell the oldest lot once price clears its entry by the same
//! spacing. Moves must be confirmed by N of the last M ticks pointing the
//! right way, which filters one-tick spikes.

use rust_decimal::Decimal;

use super::{indicators, Decision, Strategy, StrategyContext, StrategyState};
use crate::types::Trend;

pub struct AtrGridStrategy;

impl Strategy for AtrGridStrategy {
    fn name(&self) -> &'static str {
        "atr-grid"
    }

    fn decide(&self, ctx: &StrategyContext, state: &mut StrategyState) -> Decision {
        if state.cooldown_active(ctx.now, ctx.params.cooldown_secs) {
            return Decision::hold();
        }
        // No volatility estimate yet: wait for history instead of guessing.
        let Some(atr) = state.atr else {
            return Decision::hold();
        };
        if atr <= Decimal::ZERO {
            return Decision::hold();
        }

        let spacing = atr * ctx.params.atr_grid_mult;
        let confirmed = |direction: Trend| {
            indicators::recent_ticks_in_direction(&state.trends, ctx.params.confirm_m, direction)
                >= ctx.params.confirm_n
        };

        if let Some(head) = &ctx.head_lot {
            let target = head.price + spacing;
            if ctx.price >= target && confirmed(Trend::Up) {
                state.mark_action(ctx.now, ctx.price);
                return Decision::sell(
                    head.amount,
                    head.price,
                    format!(
                        "price {} cleared ATR target {} (spacing {})",
                        ctx.price, target, spacing
                    ),
                )
                .with_realized_hint((ctx.price - head.price) * head.amount);
            }
        }

        let anchor = ctx
            .lowest_lot_price
            .or_else(|| state.rolling_max())
            .unwrap_or(ctx.price);
        let level = anchor - spacing;
        if ctx.price <= level && confirmed(Trend::Down) {
            state.mark_action(ctx.now, ctx.price);
            return Decision::buy(format!(
                "price {} at ATR grid level {} (anchor {}, spacing {})",
                ctx.price, level, anchor, spacing
            ));
        }

        Decision::hold()
    }
}
