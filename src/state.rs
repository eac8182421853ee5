//! File-based state store
//!
//! Two JSON files in the data directory: `holdings.json` (symbol -> position
//! with its lot grid) and `summary.json` (the portfolio snapshot external
//! consumers read). Writes go through a temp file + rename so a reader never
//! sees a half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::Position;

const HOLDINGS_FILE: &str = "holdings.json";
const SUMMARY_FILE: &str = "summary.json";

/// Portfolio snapshot written after every cycle and on shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    /// Computed once after seeding, from fresh marks only.
    pub beginning_value: Option<Decimal>,
    pub total_value: Decimal,
    pub cash: Decimal,
    pub locked_cash: Decimal,
    pub market_value: Decimal,
    pub buys_today: u32,
    pub sells_today: u32,
    /// Realized profit accumulated today, net of profit locks.
    pub daily_profit: Decimal,
    /// Realized profit over the trailing 24 hours.
    pub realized_24h: Decimal,
}

pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create the data directory if needed.
    pub async fn init(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("creating data dir {}", self.data_dir.display()))?;
        info!("state store at {}", self.data_dir.display());
        Ok(())
    }

    /// Load persisted positions; a missing file means a fresh start.
    pub async fn load_holdings(&self) -> anyhow::Result<HashMap<String, Position>> {
        let path = self.data_dir.join(HOLDINGS_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub async fn write_holdings(
        &self,
        positions: &HashMap<String, Position>,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(positions).context("serializing holdings")?;
        self.write_atomic(HOLDINGS_FILE, &json).await
    }

    pub async fn write_summary(&self, summary: &Summary) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(summary).context("serializing summary")?;
        self.write_atomic(SUMMARY_FILE, &json).await
    }

    /// Write to `<name>.tmp`, then rename over the target.
    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let target = self.data_dir.join(name);
        let tmp = self.data_dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("replacing {}", target.display()))?;
        Ok(())
    }
}
