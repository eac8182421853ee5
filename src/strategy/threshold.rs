//! Fixed-threshold grid strategy
//!
//! Buys when price dips a fixed fraction below the buy anchor (lowest held
//! lot, or the rolling high when flat) and sells the oldest lot once price
//! rises a fixed fraction above that lot's entry.

use rust_decimal::Decimal;

use super::{Decision, Strategy, StrategyContext, StrategyState};

pub struct ThresholdStrategy;

/// Grid decision shared by the fixed, regime-adjusted, and auto-tuned
/// variants; only the thresholds differ.
pub(crate) fn grid_decide(
    ctx: &StrategyContext,
    state: &mut StrategyState,
    buy_dip: Decimal,
    sell_rise: Decimal,
    allow_buys: bool,
) -> Decision {
    if state.cooldown_active(ctx.now, ctx.params.cooldown_secs) {
        return Decision::hold();
    }

    // Sell check first: close the oldest lot at its profit target.
    if let Some(head) = &ctx.head_lot {
        let target = head.price * (Decimal::ONE + sell_rise);
        if ctx.price >= target {
            state.mark_action(ctx.now, ctx.price);
            return Decision::sell(
                head.amount,
                head.price,
                format!("price {} above lot target {}", ctx.price, target),
            )
            .with_realized_hint((ctx.price - head.price) * head.amount);
        }
    }

    if !allow_buys {
        return Decision::hold();
    }

    // Buy anchor: the lowest held lot, or the rolling high when flat.
    let anchor = ctx
        .lowest_lot_price
        .or_else(|| state.rolling_max())
        .unwrap_or(ctx.price);
    let level = anchor * (Decimal::ONE - buy_dip);
    if ctx.price <= level && anchor > ctx.price {
        state.mark_action(ctx.now, ctx.price);
        return Decision::buy(format!(
            "price {} at or below buy level {} (anchor {})",
            ctx.price, level, anchor
        ));
    }

    Decision::hold()
}

impl Strategy for ThresholdStrategy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn decide(&self, ctx: &StrategyContext, state: &mut StrategyState) -> Decision {
        grid_decide(ctx, state, ctx.params.buy_dip, ctx.params.sell_rise, true)
    }
}
