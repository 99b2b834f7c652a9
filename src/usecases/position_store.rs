//! Hot in-memory positions and cached user records.
//!
//! Positions are keyed by `(user_id, market_id)`, created lazily with zero
//! shares, and mutated only by the executor on a successful fill. Modified
//! entries are stamped and written back by the same 1 s idle-flush cadence
//! as the market store. User records pass through here so the executor can
//! guarantee one exists before trading; their balance field is maintained
//! by the balance service, not by this cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::error::Result;
use crate::domain::market::{Position, User};
use crate::domain::order::Outcome;
use crate::ports::storage::Storage;

type PositionKey = (String, String);

pub struct PositionStore<S: Storage> {
    storage: Arc<S>,
    users: RwLock<HashMap<String, User>>,
    positions: RwLock<HashMap<PositionKey, Position>>,
    /// Last-modified stamps for dirty tracking (epoch ms).
    modified_at: RwLock<HashMap<PositionKey, i64>>,
    idle_flush_threshold_ms: i64,
}

impl<S: Storage> PositionStore<S> {
    pub fn new(storage: Arc<S>, idle_flush_threshold_ms: i64) -> Self {
        Self {
            storage,
            users: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            modified_at: RwLock::new(HashMap::new()),
            idle_flush_threshold_ms,
        }
    }

    /// Cached user record, loading from storage or creating a fresh one.
    pub async fn get_or_create_user(&self, user_id: &str) -> Result<User> {
        if let Some(user) = self.users.read().await.get(user_id) {
            return Ok(user.clone());
        }
        let user = match self.storage.find_user(user_id).await? {
            Some(user) => user,
            None => User::new(user_id),
        };
        let mut cache = self.users.write().await;
        let entry = cache
            .entry(user_id.to_string())
            .or_insert_with(|| user.clone());
        Ok(entry.clone())
    }

    /// Cached position, loading from storage or creating one with zero
    /// shares.
    pub async fn get_or_create_position(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Position> {
        let key = (user_id.to_string(), market_id.to_string());
        if let Some(position) = self.positions.read().await.get(&key) {
            return Ok(position.clone());
        }
        let position = match self.storage.find_position(user_id, market_id).await? {
            Some(position) => position,
            None => Position::new(user_id, market_id),
        };
        let mut cache = self.positions.write().await;
        let entry = cache.entry(key).or_insert_with(|| position.clone());
        Ok(entry.clone())
    }

    /// Add filled shares to the cached position and mark it dirty.
    pub async fn apply_fill(
        &self,
        user_id: &str,
        market_id: &str,
        outcome: Outcome,
        quantity: u32,
        now_ms: i64,
    ) -> Result<Position> {
        let key = (user_id.to_string(), market_id.to_string());
        let updated = {
            let mut cache = self.positions.write().await;
            let position = cache
                .entry(key.clone())
                .or_insert_with(|| Position::new(user_id, market_id));
            position.add_shares(outcome, quantity);
            position.clone()
        };
        self.mark_modified(user_id, market_id, now_ms).await;
        Ok(updated)
    }

    /// Stamp the entry's last-modified time for the idle flush.
    pub async fn mark_modified(&self, user_id: &str, market_id: &str, now_ms: i64) {
        self.modified_at
            .write()
            .await
            .insert((user_id.to_string(), market_id.to_string()), now_ms);
    }

    /// Current cached position without touching durable storage.
    pub async fn snapshot(&self, user_id: &str, market_id: &str) -> Option<Position> {
        self.positions
            .read()
            .await
            .get(&(user_id.to_string(), market_id.to_string()))
            .cloned()
    }

    /// Write back positions idle for longer than the threshold.
    /// Best-effort: failures are logged and retried at the next tick.
    #[instrument(skip(self))]
    pub async fn flush_idle(&self, now_ms: i64) -> usize {
        let candidates: Vec<PositionKey> = {
            let modified = self.modified_at.read().await;
            modified
                .iter()
                .filter(|(_, &stamp)| now_ms - stamp > self.idle_flush_threshold_ms)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut flushed = 0;
        for key in candidates {
            let Some(position) = self.positions.read().await.get(&key).cloned() else {
                self.modified_at.write().await.remove(&key);
                continue;
            };
            match self.storage.upsert_position(&position).await {
                Ok(()) => {
                    self.modified_at.write().await.remove(&key);
                    flushed += 1;
                    debug!(
                        user_id = %key.0,
                        market_id = %key.1,
                        "Persisted position"
                    );
                }
                Err(e) => {
                    warn!(
                        user_id = %key.0,
                        market_id = %key.1,
                        error = %e,
                        "Failed to persist position, will retry"
                    );
                }
            }
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, PositionStore<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = PositionStore::new(Arc::clone(&storage), 1_000);
        (storage, store)
    }

    #[tokio::test]
    async fn creates_zero_share_position_on_miss() {
        let (_, store) = store();
        let position = store.get_or_create_position("alice", "m1").await.unwrap();
        assert_eq!(position.yes_shares, 0);
        assert_eq!(position.no_shares, 0);
    }

    #[tokio::test]
    async fn loads_existing_position_from_storage() {
        let (storage, store) = store();
        let mut existing = Position::new("alice", "m1");
        existing.add_shares(Outcome::Yes, 7);
        storage.upsert_position(&existing).await.unwrap();

        let position = store.get_or_create_position("alice", "m1").await.unwrap();
        assert_eq!(position.yes_shares, 7);
    }

    #[tokio::test]
    async fn apply_fill_accumulates_and_marks_dirty() {
        let (_, store) = store();
        store
            .apply_fill("alice", "m1", Outcome::Yes, 10, 1_000)
            .await
            .unwrap();
        let position = store
            .apply_fill("alice", "m1", Outcome::Yes, 5, 2_000)
            .await
            .unwrap();
        assert_eq!(position.yes_shares, 15);
    }

    #[tokio::test]
    async fn flush_respects_idle_threshold() {
        let (storage, store) = store();
        store
            .apply_fill("alice", "m1", Outcome::No, 3, 10_000)
            .await
            .unwrap();

        assert_eq!(store.flush_idle(10_500).await, 0);
        assert_eq!(store.flush_idle(12_000).await, 1);
        // Clean after a successful flush.
        assert_eq!(store.flush_idle(13_000).await, 0);

        let persisted = storage.find_position("alice", "m1").await.unwrap().unwrap();
        assert_eq!(persisted.no_shares, 3);
    }

    #[tokio::test]
    async fn get_or_create_user_is_stable() {
        let (_, store) = store();
        let first = store.get_or_create_user("alice").await.unwrap();
        let second = store.get_or_create_user("alice").await.unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(first.balance, second.balance);
    }
}
