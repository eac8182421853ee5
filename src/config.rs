//! Engine configuration
//!
//! Everything is loaded from the environment (plus an optional `.env` file
//! read by the binary before this runs). Missing variables fall back to
//! documented defaults; present-but-invalid values are a fatal startup error.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;

/// Paper vs real order execution.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Paper trading (`DEMO_MODE`/`TEST_MODE`) vs live orders.
    pub trading_mode: TradingMode,
    /// Starting cash reserve in USD (`INITIAL_BALANCE`).
    pub initial_balance: Decimal,
    /// Symbols to trade, in tick processing order (`SYMBOLS`).
    pub symbols: Vec<String>,
    /// Interval between trading cycles (`TICK_INTERVAL_MS`).
    pub tick_interval: Duration,
    /// Ordered price provider list (`PRICE_PROVIDERS`).
    pub providers: Vec<ProviderKind>,
    /// Maximum quote age still considered live (`PRICE_FRESHNESS_MS`).
    pub price_freshness: Duration,
    /// Rolling price history length per symbol (`PRICE_HISTORY_LEN`).
    pub history_len: usize,
    /// Rolling trend history length per symbol (`TREND_HISTORY_LEN`).
    pub trend_len: usize,
    /// Selected strategy name (`STRATEGY`).
    pub strategy: String,
    /// Strategy tuning knobs.
    pub strategy_params: StrategyParams,
    /// Risk / profit-lock knobs.
    pub risk: RiskConfig,
    /// Fraction of cash a single buy may spend (`BUY_CASH_FRACTION`).
    pub buy_cash_fraction: Decimal,
    /// Minimum trade notional in USD (`MIN_TRADE_USD`).
    pub min_trade_usd: Decimal,
    /// Position amounts below this are treated as dust (`MIN_HOLDING`).
    pub min_holding: Decimal,
    /// Estimated sell slippage as a fraction (`SLIPPAGE_PCT`).
    pub slippage: Decimal,
    /// Taker fee as a fraction (`FEE_PCT`).
    pub fee: Decimal,
    /// Data directory for holdings/summary/events (`DATA_DIR`).
    pub data_dir: PathBuf,
    /// Grace period for shutdown persistence (`SHUTDOWN_GRACE_MS`).
    pub shutdown_grace: Duration,
    /// Broker API endpoints/credentials (only required for the broker
    /// provider and live trading).
    pub broker: BrokerConfig,
}

/// Tunable strategy parameters, shared by all strategy variants.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Buy when price dips this fraction below the anchor (`BUY_DIP_PCT`).
    pub buy_dip: Decimal,
    /// Sell when price rises this fraction above the lot entry (`SELL_RISE_PCT`).
    pub sell_rise: Decimal,
    /// Minimum seconds between trades on one symbol (`TRADE_COOLDOWN_SECS`).
    pub cooldown_secs: i64,
    /// ATR lookback window in ticks (`ATR_LOOKBACK`).
    pub atr_lookback: usize,
    /// ATR multiple used as grid spacing (`ATR_GRID_MULT`).
    pub atr_grid_mult: Decimal,
    /// Confirmation: require N of the last M ticks in the move's direction.
    pub confirm_n: usize,
    pub confirm_m: usize,
    /// Auto-tune: adjust thresholds every this many completed sells.
    pub tune_every: u32,
}

/// Risk manager configuration.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Drawdown fraction below ATH that engages the brake (`STOP_LOSS_BRAKE_PCT`).
    pub brake_drawdown: Decimal,
    /// Drawdown fraction the brake releases below (`STOP_LOSS_RELEASE_PCT`).
    pub release_drawdown: Decimal,
    /// Minimum net profit in USD for a sell to pass (`MIN_PROFIT_USD`).
    pub min_profit_usd: Decimal,
    /// Fraction of daily realized profit swept per lock (`PROFIT_LOCK_FRACTION`).
    pub lock_fraction: Decimal,
    /// Daily realized profit that triggers a sweep (`PROFIT_LOCK_AMOUNT`).
    pub lock_trigger_usd: Decimal,
    /// Minimum seconds between sweeps (`PROFIT_LOCK_MIN_INTERVAL_SECS`).
    pub lock_min_interval_secs: i64,
    /// Optional UTC hour for the scheduled daily sweep (`PROFIT_LOCK_HOUR_UTC`).
    pub lock_hour_utc: Option<u32>,
}

/// Broker endpoint and credential configuration.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Authenticated API base URL (`BROKER_API_URL`).
    pub api_url: String,
    /// Public (unauthenticated) quote base URL (`BROKER_PUBLIC_URL`).
    pub public_url: String,
    /// `BROKER_API_KEY`
    pub api_key: Option<String>,
    /// `BROKER_BEARER_TOKEN`
    pub bearer_token: Option<String>,
    /// Base64-encoded 32-byte Ed25519 seed (`ED25519_PRIVATE_KEY`).
    pub signing_seed: Option<String>,
}

impl EngineConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let demo = env_parse("DEMO_MODE", true)? || env_parse("TEST_MODE", false)?;
        let trading_mode = if demo {
            TradingMode::Paper
        } else {
            TradingMode::Live
        };

        let symbols: Vec<String> = env_string("SYMBOLS", "BTCUSD,ETHUSD")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            bail!("SYMBOLS must name at least one symbol");
        }

        let providers = parse_providers(&env_string(
            "PRICE_PROVIDERS",
            "broker,broker-public,coingecko,binance",
        ))?;

        let data_dir = std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".grid-runner")
        });

        Ok(Self {
            trading_mode,
            initial_balance: env_parse("INITIAL_BALANCE", Decimal::from(1000))?,
            symbols,
            tick_interval: Duration::from_millis(env_parse("TICK_INTERVAL_MS", 30_000u64)?),
            providers,
            price_freshness: Duration::from_millis(env_parse("PRICE_FRESHNESS_MS", 15_000u64)?),
            history_len: env_parse("PRICE_HISTORY_LEN", 400usize)?,
            trend_len: env_parse("TREND_HISTORY_LEN", 50usize)?,
            strategy: env_string("STRATEGY", crate::strategy::DEFAULT_STRATEGY),
            strategy_params: StrategyParams {
                buy_dip: env_parse("BUY_DIP_PCT", Decimal::new(15, 3))?, // 1.5%
                sell_rise: env_parse("SELL_RISE_PCT", Decimal::new(2, 2))?, // 2.0%
                cooldown_secs: env_parse("TRADE_COOLDOWN_SECS", 120i64)?,
                atr_lookback: env_parse("ATR_LOOKBACK", 14usize)?,
                atr_grid_mult: env_parse("ATR_GRID_MULT", Decimal::from(2))?,
                confirm_n: env_parse("CONFIRM_N", 2usize)?,
                confirm_m: env_parse("CONFIRM_M", 3usize)?,
                tune_every: env_parse("TUNE_EVERY", 5u32)?,
            },
            risk: RiskConfig {
                brake_drawdown: env_parse("STOP_LOSS_BRAKE_PCT", Decimal::new(15, 2))?,
                release_drawdown: env_parse("STOP_LOSS_RELEASE_PCT", Decimal::new(10, 2))?,
                min_profit_usd: env_parse("MIN_PROFIT_USD", Decimal::ZERO)?,
                lock_fraction: env_parse("PROFIT_LOCK_FRACTION", Decimal::new(2, 1))?,
                lock_trigger_usd: env_parse("PROFIT_LOCK_AMOUNT", Decimal::from(50))?,
                lock_min_interval_secs: env_parse("PROFIT_LOCK_MIN_INTERVAL_SECS", 3600i64)?,
                lock_hour_utc: env_opt_parse("PROFIT_LOCK_HOUR_UTC")?,
            },
            buy_cash_fraction: env_parse("BUY_CASH_FRACTION", Decimal::new(1, 1))?, // 10%
            min_trade_usd: env_parse("MIN_TRADE_USD", Decimal::from(10))?,
            min_holding: env_parse("MIN_HOLDING", Decimal::new(1, 6))?,
            slippage: env_parse("SLIPPAGE_PCT", Decimal::new(1, 3))?, // 0.1%
            fee: env_parse("FEE_PCT", Decimal::new(25, 4))?,          // 0.25%
            data_dir,
            shutdown_grace: Duration::from_millis(env_parse("SHUTDOWN_GRACE_MS", 3_000u64)?),
            broker: BrokerConfig {
                api_url: env_string("BROKER_API_URL", "https://api.broker.example.com"),
                public_url: env_string("BROKER_PUBLIC_URL", "https://public.broker.example.com"),
                api_key: std::env::var("BROKER_API_KEY").ok(),
                bearer_token: std::env::var("BROKER_BEARER_TOKEN").ok(),
                signing_seed: std::env::var("ED25519_PRIVATE_KEY").ok(),
            },
        })
    }
}

/// Parse the ordered provider list, e.g. "broker,coingecko,binance".
fn parse_providers(raw: &str) -> anyhow::Result<Vec<ProviderKind>> {
    let kinds: Vec<ProviderKind> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProviderKind::from_str)
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("invalid PRICE_PROVIDERS value {raw:?}: {e}"))?;
    if kinds.is_empty() {
        bail!("PRICE_PROVIDERS must name at least one provider");
    }
    Ok(kinds)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Missing variable -> default; present but unparsable -> fatal error.
fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_opt_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_list_parses_in_order() {
        let kinds = parse_providers("binance, coingecko").unwrap();
        assert_eq!(kinds, vec![ProviderKind::Binance, ProviderKind::CoinGecko]);
    }

    #[test]
    fn provider_list_rejects_unknown() {
        let err = parse_providers("binance,kraken").unwrap_err();
        assert!(err.to_string().contains("PRICE_PROVIDERS"));
        assert!(err.to_string().contains("kraken"));
    }

    #[test]
    fn empty_provider_list_is_an_error() {
        assert!(parse_providers(" , ").is_err());
    }
}
