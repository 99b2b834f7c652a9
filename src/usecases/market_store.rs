//! Hot in-memory market state, idle-flushed to durable storage.
//!
//! Markets load lazily on first trade and stay cached; the executor's
//! per-market lane is the only mutator. A 1 s ticker writes back entries
//! that have been quiet for longer than the idle threshold and whose latest
//! trade is not yet durable. Durable storage is NOT the source of truth for
//! balances (the ledger is), so a lost flush only delays observability.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::error::{EngineError, Result};
use crate::domain::market::MarketState;
use crate::domain::order::Outcome;
use crate::ports::storage::Storage;

pub struct MarketStore<S: Storage> {
    storage: Arc<S>,
    markets: RwLock<HashMap<String, MarketState>>,
    idle_flush_threshold_ms: i64,
}

impl<S: Storage> MarketStore<S> {
    pub fn new(storage: Arc<S>, idle_flush_threshold_ms: i64) -> Self {
        Self {
            storage,
            markets: RwLock::new(HashMap::new()),
            idle_flush_threshold_ms,
        }
    }

    /// Cached state, loading from durable storage on a miss. Markets must
    /// be pre-created; a miss in both cache and storage returns `None`.
    pub async fn get_or_load(&self, market_id: &str) -> Result<Option<MarketState>> {
        if let Some(market) = self.markets.read().await.get(market_id) {
            return Ok(Some(market.clone()));
        }

        match self.storage.find_market(market_id).await? {
            Some(market) => {
                let mut cache = self.markets.write().await;
                let entry = cache
                    .entry(market_id.to_string())
                    .or_insert_with(|| market.clone());
                Ok(Some(entry.clone()))
            }
            None => {
                warn!(
                    market_id = %market_id,
                    "Market not found in durable storage; markets must be pre-created"
                );
                Ok(None)
            }
        }
    }

    /// Register a new market and persist it immediately.
    pub async fn create(&self, market: MarketState) -> Result<()> {
        self.storage.upsert_market(&market).await?;
        self.markets
            .write()
            .await
            .insert(market.market_id.clone(), market);
        Ok(())
    }

    /// Apply a fill to the cached entry: move the pool, stamp the trade
    /// time, reprice. Returns the updated state.
    pub async fn record_trade(
        &self,
        market_id: &str,
        outcome: Outcome,
        quantity: u32,
        now_ms: i64,
    ) -> Result<MarketState> {
        let mut cache = self.markets.write().await;
        let market = cache
            .get_mut(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.to_string()))?;
        market.apply_trade(outcome, quantity, now_ms);
        Ok(market.clone())
    }

    /// Current cached state without touching durable storage.
    pub async fn snapshot(&self, market_id: &str) -> Option<MarketState> {
        self.markets.read().await.get(market_id).cloned()
    }

    /// Write back idle, unpersisted markets. Best-effort: a failed write is
    /// logged and retried at the next tick.
    #[instrument(skip(self))]
    pub async fn flush_idle(&self, now_ms: i64) -> usize {
        let candidates: Vec<MarketState> = {
            let cache = self.markets.read().await;
            cache
                .values()
                .filter(|m| m.needs_flush(now_ms, self.idle_flush_threshold_ms))
                .cloned()
                .collect()
        };

        let mut flushed = 0;
        for market in candidates {
            match self.storage.upsert_market(&market).await {
                Ok(()) => {
                    let mut cache = self.markets.write().await;
                    if let Some(live) = cache.get_mut(&market.market_id) {
                        live.last_persisted_timestamp = now_ms;
                    }
                    flushed += 1;
                    debug!(market_id = %market.market_id, "Persisted market state");
                }
                Err(e) => {
                    warn!(
                        market_id = %market.market_id,
                        error = %e,
                        "Failed to persist market state, will retry"
                    );
                }
            }
        }
        flushed
    }
}
