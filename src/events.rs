//! Append-only trade event journal
//!
//! One JSON object per line, appended to `events.jsonl` in the data
//! directory. The journal is observability, not a ledger: a write failure is
//! logged and swallowed so it can never take the trading loop down.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Buy,
    Sell,
    ProfitLock,
    BrakeEngaged,
    BrakeReleased,
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub time: DateTime<Utc>,
    pub event: EventType,
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TradeEvent {
    pub fn new(event: EventType) -> Self {
        Self {
            time: Utc::now(),
            event,
            symbol: None,
            price: None,
            quantity: None,
            realized: None,
            reason: None,
        }
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn realized(mut self, realized: Decimal) -> Self {
        self.realized = Some(realized);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            path: data_dir.join("events.jsonl"),
        }
    }

    /// Append one event. Failures are logged, never propagated.
    pub async fn append(&self, event: &TradeEvent) {
        let mut line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("failed to serialize trade event: {e}");
                return;
            }
        };
        line.push('\n');

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            error!("failed to append to {}: {e}", self.path.display());
        }
    }
}
