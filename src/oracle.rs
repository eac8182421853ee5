//! Price oracle
//!
//! Walks an ordered provider list per symbol and returns the first usable
//! live price. Keeps a per-symbol quote cache for freshness short-circuiting
//! and for the non-live fallback path used during seeding/valuation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::providers::PriceProvider;
use crate::types::Quote;

pub struct PriceOracle {
    providers: Vec<Box<dyn PriceProvider>>,
    freshness: Duration,
    cache: HashMap<String, Quote>,
    /// (provider, symbol) pairs whose failure has already been logged at
    /// warn level; repeats drop to debug to avoid log storms.
    logged_failures: HashSet<(String, String)>,
}

impl PriceOracle {
    pub fn new(providers: Vec<Box<dyn PriceProvider>>, freshness: Duration) -> Self {
        Self {
            providers,
            freshness,
            cache: HashMap::new(),
            logged_failures: HashSet::new(),
        }
    }

    /// Get a price for `symbol`.
    ///
    /// With `require_live`, only a quote fetched now (or cached within the
    /// freshness window) is acceptable; if every provider fails the answer is
    /// `None` and the caller must not trade this symbol this tick.
    ///
    /// Without `require_live` (seeding/valuation), the fallback order is:
    /// last cached quote, then `fallback_basis` (the position's cost basis),
    /// then zero.
    pub async fn get_price(
        &mut self,
        symbol: &str,
        require_live: bool,
        fallback_basis: Option<Decimal>,
    ) -> Option<Quote> {
        let now = Utc::now();

        // Fresh cached quote short-circuits the provider loop.
        if let Some(cached) = self.cache.get(symbol) {
            if cached.live && cached.age(now).to_std().map_or(false, |a| a <= self.freshness) {
                return Some(cached.clone());
            }
        }

        for i in 0..self.providers.len() {
            let name = self.providers[i].name();
            match self.providers[i].fetch(symbol).await {
                Ok(price) => {
                    let quote = Quote {
                        symbol: symbol.to_string(),
                        price,
                        source: name.to_string(),
                        timestamp: Utc::now(),
                        live: true,
                    };
                    self.cache.insert(symbol.to_string(), quote.clone());
                    self.logged_failures
                        .remove(&(name.to_string(), symbol.to_string()));
                    return Some(quote);
                }
                Err(e) => {
                    // Log each (provider, symbol) failure once at warn level.
                    let key = (name.to_string(), symbol.to_string());
                    if self.logged_failures.insert(key) {
                        warn!("Price fetch failed: {} for {}: {}", name, symbol, e);
                    } else {
                        debug!("Price fetch failed: {} for {}: {}", name, symbol, e);
                    }
                }
            }
        }

        if require_live {
            debug!("No live price available for {}", symbol);
            return None;
        }

        // Non-live fallback: cached quote, then cost basis, then zero.
        if let Some(cached) = self.cache.get(symbol) {
            let mut quote = cached.clone();
            quote.live = false;
            return Some(quote);
        }

        let price = fallback_basis.unwrap_or(Decimal::ZERO);
        Some(Quote {
            symbol: symbol.to_string(),
            price,
            source: "fallback".to_string(),
            timestamp: now,
            live: false,
        })
    }

    /// Last cached quote for a symbol, if any.
    pub fn cached(&self, symbol: &str) -> Option<&Quote> {
        self.cache.get(symbol)
    }
}
