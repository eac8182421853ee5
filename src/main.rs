//! Grid Runner - grid-trading engine entry point
//!
//! Wires the pieces together:
//! 1. Loads configuration from the environment (and an optional `.env`)
//! 2. Builds the ordered price provider list and the oracle
//! 3. Picks the strategy from the registry
//! 4. Spawns the command frontends (signals, sentinel files, stdin)
//! 5. Hands everything to the engine and runs until shutdown

use tokio::sync::mpsc;
use tracing::{info, warn};

use grid_runner::providers::{
    BinanceProvider, BrokerProvider, BrokerPublicProvider, CoinGeckoProvider,
};
use grid_runner::{
    spawn_command_sources, BrokerClient, Engine, EngineConfig, PriceOracle, PriceProvider,
    ProviderKind, SessionProvider, StrategyRegistry, TradeExecutor, TradingMode,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Grid Runner...");

    let config = EngineConfig::from_env()?;
    info!(
        "symbols: {} | strategy: {} | tick every {:?}",
        config.symbols.join(","),
        config.strategy,
        config.tick_interval
    );

    let providers = build_providers(&config)?;
    let oracle = PriceOracle::new(providers, config.price_freshness);

    let executor = match config.trading_mode {
        TradingMode::Paper => {
            info!("running in PAPER mode, fills are simulated");
            TradeExecutor::paper(config.slippage)
        }
        TradingMode::Live => {
            warn!("running in LIVE mode, orders go to the broker");
            let session = SessionProvider::from_config(&config.broker)?;
            TradeExecutor::live(BrokerClient::new(&config.broker.api_url, session)?)
        }
    };

    let mut registry = StrategyRegistry::with_builtins();
    let strategy = registry.take(&config.strategy).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown strategy {:?} (available: {})",
            config.strategy,
            registry.names().join(", ")
        )
    })?;

    let (tx, rx) = mpsc::channel(16);
    spawn_command_sources(config.data_dir.clone(), tx);

    let engine = Engine::new(config, oracle, executor, strategy);
    engine.run(rx).await
}

/// Instantiate the configured providers in order. The authenticated broker
/// provider is skipped (with a warning) when credentials are missing, so a
/// paper setup works without any broker account.
fn build_providers(config: &EngineConfig) -> anyhow::Result<Vec<Box<dyn PriceProvider>>> {
    let mut providers: Vec<Box<dyn PriceProvider>> = Vec::new();

    for kind in &config.providers {
        match kind {
            ProviderKind::Broker => match SessionProvider::from_config(&config.broker) {
                Ok(session) => {
                    let client = BrokerClient::new(&config.broker.api_url, session)?;
                    providers.push(Box::new(BrokerProvider::new(client)));
                }
                Err(e) => warn!("skipping broker provider: {e}"),
            },
            ProviderKind::BrokerPublic => {
                providers.push(Box::new(BrokerPublicProvider::new(&config.broker.public_url)));
            }
            ProviderKind::CoinGecko => {
                providers.push(Box::new(CoinGeckoProvider::new(CoinGeckoProvider::default_url())));
            }
            ProviderKind::Binance => {
                providers.push(Box::new(BinanceProvider::new(BinanceProvider::default_url())));
            }
        }
    }

    if providers.is_empty() {
        anyhow::bail!("no usable price providers configured");
    }
    Ok(providers)
}
