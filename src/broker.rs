//! Broker REST client
//!
//! Thin wrapper over the broker's signed-request envelope. Used by the
//! authenticated price provider and, in live mode, by the trade executor.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::SessionProvider;
use crate::types::{Fill, TradeAction};

/// Client for the broker's authenticated API.
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
    session: SessionProvider,
}

impl BrokerClient {
    pub fn new(base_url: &str, session: SessionProvider) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Fetch the broker's quote for a symbol.
    pub async fn get_quote(&self, symbol: &str) -> anyhow::Result<Decimal> {
        let path = format!("/api/v1/quotes/{symbol}");
        let headers = self.session.sign(&path, "GET", "");

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &headers.authorization)
            .header("x-api-key", &headers.api_key)
            .header("x-timestamp", &headers.timestamp)
            .header("x-signature", &headers.signature)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("broker quote failed: {} - {}", status, text);
        }

        let quote: QuoteResponse = response.json().await?;
        quote
            .price
            .parse()
            .map_err(|e| anyhow::anyhow!("broker returned unparsable price: {e}"))
    }

    /// Submit a market order and return the confirmed fill.
    pub async fn submit_market_order(
        &self,
        symbol: &str,
        side: TradeAction,
        quantity: Decimal,
    ) -> anyhow::Result<Fill> {
        let path = "/api/v1/orders";
        let req = OrderRequest {
            symbol: symbol.to_string(),
            side: side.to_string(),
            order_type: "market".to_string(),
            quantity,
        };
        let body = serde_json::to_string(&req)?;
        let headers = self.session.sign(path, "POST", &body);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", &headers.authorization)
            .header("x-api-key", &headers.api_key)
            .header("x-timestamp", &headers.timestamp)
            .header("x-signature", &headers.signature)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("order submit failed: {} - {}", status, text);
        }

        let order: OrderResponse = response.json().await?;
        let price: Decimal = order
            .fill_price
            .parse()
            .map_err(|e| anyhow::anyhow!("broker returned unparsable fill price: {e}"))?;
        let quantity: Decimal = order
            .filled_quantity
            .parse()
            .map_err(|e| anyhow::anyhow!("broker returned unparsable fill quantity: {e}"))?;

        info!(
            "Order {} confirmed: {} {} {} @ {}",
            order.order_id, side, quantity, symbol, price
        );

        Ok(Fill {
            price,
            quantity,
            order_id: Some(order.order_id),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    quantity: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    fill_price: String,
    filled_quantity: String,
}
