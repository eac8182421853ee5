//! Shared indicator math used by several strategy variants.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use super::Regime;
use crate::types::Trend;

/// History length required before the regime classifier trusts its SMAs.
pub const REGIME_MIN_HISTORY: usize = 201;

/// Directional tick fraction at or above which a trend counts as strong.
const STRONG_TREND_FRACTION: f64 = 0.6;

/// Simple moving average over the last `period` prices.
pub fn sma(prices: &VecDeque<Decimal>, period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let sum: Decimal = prices.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period as i64))
}

/// ATR proxy: mean absolute tick-to-tick delta over the last `lookback`
/// deltas. Needs `lookback + 1` prices.
pub fn atr(prices: &VecDeque<Decimal>, lookback: usize) -> Option<Decimal> {
    if lookback == 0 || prices.len() < lookback + 1 {
        return None;
    }
    let tail: Vec<Decimal> = prices.iter().rev().take(lookback + 1).copied().collect();
    let sum: Decimal = tail.windows(2).map(|w| (w[0] - w[1]).abs()).sum();
    Some(sum / Decimal::from(lookback as i64))
}

/// Fraction of up and down ticks in the trend history.
pub fn trend_fractions(trends: &VecDeque<Trend>) -> (f64, f64) {
    if trends.is_empty() {
        return (0.0, 0.0);
    }
    let total = trends.len() as f64;
    let ups = trends.iter().filter(|t| **t == Trend::Up).count() as f64;
    let downs = trends.iter().filter(|t| **t == Trend::Down).count() as f64;
    (ups / total, downs / total)
}

/// Regime classification shared by the regime-switching strategies.
///
/// Below `REGIME_MIN_HISTORY` points this defaults to uptrend - a documented
/// startup bias so a freshly seeded bot is willing to enter, not a general
/// default.
pub fn classify_regime(
    price: Decimal,
    history_len: usize,
    sma_fast: Option<Decimal>,
    sma_slow: Option<Decimal>,
    trends: &VecDeque<Trend>,
) -> Regime {
    if history_len < REGIME_MIN_HISTORY {
        return Regime::Uptrend;
    }
    let (Some(fast), Some(slow)) = (sma_fast, sma_slow) else {
        return Regime::Uptrend;
    };

    let (up_frac, down_frac) = trend_fractions(trends);

    if price > fast && fast > slow && up_frac >= STRONG_TREND_FRACTION {
        return Regime::Uptrend;
    }
    if price < fast && fast < slow && down_frac >= STRONG_TREND_FRACTION {
        return Regime::Downtrend;
    }

    // Within 1% of the long SMA with no strong direction: rangebound.
    // Everything else also defaults to rangebound.
    Regime::Rangebound
}

/// Count how many of the last `m` ticks moved in `direction`.
pub fn recent_ticks_in_direction(trends: &VecDeque<Trend>, m: usize, direction: Trend) -> usize {
    trends
        .iter()
        .rev()
        .take(m)
        .filter(|t| **t == direction)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> VecDeque<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn sma_over_tail() {
        let p = prices(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(sma(&p, 3), Some(Decimal::from(5))); // (4+5+6)/3
        assert_eq!(sma(&p, 7), None);
        assert_eq!(sma(&p, 0), None);
    }

    #[test]
    fn atr_is_mean_absolute_delta() {
        let p = prices(&[100, 102, 99, 103]);
        // |103-99| + |99-102| + |102-100| = 9, over 3 deltas
        assert_eq!(atr(&p, 3), Some(Decimal::from(3)));
        assert_eq!(atr(&p, 4), None);
    }

    #[test]
    fn startup_bias_is_uptrend() {
        let p: VecDeque<Decimal> = prices(&[100; 50]);
        let trends = VecDeque::new();
        let regime = classify_regime(
            Decimal::from(100),
            p.len(),
            sma(&p, 50),
            sma(&p, 200),
            &trends,
        );
        assert_eq!(regime, Regime::Uptrend);
    }

    #[test]
    fn strong_uptrend_is_classified() {
        // price above fast above slow, with 80% up ticks.
        let trends: VecDeque<Trend> = (0..10)
            .map(|i| if i % 5 == 0 { Trend::Down } else { Trend::Up })
            .collect();
        let regime = classify_regime(
            Decimal::from(110),
            REGIME_MIN_HISTORY,
            Some(Decimal::from(105)),
            Some(Decimal::from(100)),
            &trends,
        );
        assert_eq!(regime, Regime::Uptrend);
    }

    #[test]
    fn weak_direction_is_rangebound() {
        let trends: VecDeque<Trend> = (0..10)
            .map(|i| if i % 2 == 0 { Trend::Up } else { Trend::Down })
            .collect();
        let regime = classify_regime(
            Decimal::from(100),
            REGIME_MIN_HISTORY,
            Some(Decimal::from(101)),
            Some(Decimal::from(100)),
            &trends,
        );
        assert_eq!(regime, Regime::Rangebound);
    }

    #[test]
    fn mirrored_downtrend_is_classified() {
        let trends: VecDeque<Trend> = (0..10).map(|_| Trend::Down).collect();
        let regime = classify_regime(
            Decimal::from(90),
            REGIME_MIN_HISTORY,
            Some(Decimal::from(95)),
            Some(Decimal::from(100)),
            &trends,
        );
        assert_eq!(regime, Regime::Downtrend);
    }

    #[test]
    fn direction_counting() {
        let trends: VecDeque<Trend> =
            vec![Trend::Up, Trend::Down, Trend::Down, Trend::Up, Trend::Down]
                .into_iter()
                .collect();
        assert_eq!(recent_ticks_in_direction(&trends, 3, Trend::Down), 2);
        assert_eq!(recent_ticks_in_direction(&trends, 5, Trend::Up), 2);
    }
}
