//! Quote providers
//!
//! Each provider knows how to map an engine symbol ("BTCUSD") to its own
//! format and fetch one spot price. The oracle walks an ordered list of
//! these and takes the first finite, positive price.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::broker::BrokerClient;

/// Error types for quote fetching
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("symbol not supported: {0}")]
    UnsupportedSymbol(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Trait for spot-price providers.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name, used for quote tagging and failure logging.
    fn name(&self) -> &'static str;

    /// Fetch the current price for a symbol like "BTCUSD".
    async fn fetch(&self, symbol: &str) -> Result<Decimal>;
}

/// Provider identifiers for the `PRICE_PROVIDERS` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Broker, authenticated (signed envelope).
    Broker,
    /// Broker, public unauthenticated quotes.
    BrokerPublic,
    /// CoinGecko spot API.
    CoinGecko,
    /// Binance spot API.
    Binance,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "broker" => Ok(ProviderKind::Broker),
            "broker-public" | "broker_public" => Ok(ProviderKind::BrokerPublic),
            "coingecko" => Ok(ProviderKind::CoinGecko),
            "binance" => Ok(ProviderKind::Binance),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

/// Reject non-positive prices so the oracle never trades on a zero quote.
fn validate(price: Decimal) -> Result<Decimal> {
    if price > Decimal::ZERO {
        Ok(price)
    } else {
        Err(ProviderError::InvalidResponse(format!(
            "non-positive price: {price}"
        )))
    }
}

/// Split "BTCUSD" into ("BTC", "USD"). Quote currency is always the trailing
/// USD/USDT/USDC component.
fn split_symbol(symbol: &str) -> Result<(&str, &str)> {
    for quote in ["USDT", "USDC", "USD"] {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return Ok((base, quote));
            }
        }
    }
    Err(ProviderError::UnsupportedSymbol(symbol.to_string()))
}

// --- Broker (authenticated) ---

pub struct BrokerProvider {
    client: BrokerClient,
}

impl BrokerProvider {
    pub fn new(client: BrokerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PriceProvider for BrokerProvider {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let price = self
            .client
            .get_quote(symbol)
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        validate(price)
    }
}

// --- Broker (public) ---

pub struct BrokerPublicProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BrokerPublicProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct PublicQuoteResponse {
    price: String,
}

#[async_trait]
impl PriceProvider for BrokerPublicProvider {
    fn name(&self) -> &'static str {
        "broker-public"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/v1/quotes/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Api(format!(
                "broker-public returned {}",
                response.status()
            )));
        }

        let quote: PublicQuoteResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let price = quote
            .price
            .parse::<Decimal>()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        validate(price)
    }
}

// --- CoinGecko ---

pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn default_url() -> &'static str {
        "https://api.coingecko.com/api/v3"
    }

    /// Static symbol -> CoinGecko id map; avoids the expensive search API.
    fn coin_id(base: &str) -> Option<&'static str> {
        match base {
            "BTC" => Some("bitcoin"),
            "ETH" => Some("ethereum"),
            "SOL" => Some("solana"),
            "XRP" => Some("ripple"),
            "ADA" => Some("cardano"),
            "DOGE" => Some("dogecoin"),
            "LTC" => Some("litecoin"),
            "DOT" => Some("polkadot"),
            "LINK" => Some("chainlink"),
            "AVAX" => Some("avalanche-2"),
            _ => None,
        }
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let (base, _) = split_symbol(symbol)?;
        let coin_id = Self::coin_id(base)
            .ok_or_else(|| ProviderError::UnsupportedSymbol(symbol.to_string()))?;

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin_id
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Api(format!(
                "coingecko returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // CoinGecko returns JSON numbers, so an f64 intermediate is unavoidable.
        let price = body
            .get(coin_id)
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())
            .filter(|p| p.is_finite())
            .ok_or_else(|| ProviderError::InvalidResponse("missing usd price".to_string()))?;

        let price = Decimal::try_from(price)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        validate(price)
    }
}

// --- Binance ---

pub struct BinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn default_url() -> &'static str {
        "https://api.binance.com"
    }

    /// Binance has no USD spot pairs; quote USD symbols against USDT.
    fn map_symbol(symbol: &str) -> Result<String> {
        let (base, quote) = split_symbol(symbol)?;
        let quote = if quote == "USD" { "USDT" } else { quote };
        Ok(format!("{base}{quote}"))
    }
}

#[derive(Debug, serde::Deserialize)]
struct BinanceTicker {
    price: String,
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let pair = Self::map_symbol(symbol)?;
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, pair);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Api(format!(
                "binance returned {}",
                response.status()
            )));
        }

        let ticker: BinanceTicker = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let price = ticker
            .price
            .parse::<Decimal>()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        validate(price)
    }
}
