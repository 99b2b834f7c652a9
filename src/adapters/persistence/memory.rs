//! In-memory reference implementation of the storage contract.
//!
//! The semantics any durable engine must provide, expressed with RwLock'd
//! maps: unique-nonce inserts, insertion-ordered transaction log, atomic
//! conditional status updates. Used directly by the test suite and as the
//! index layer inside the file-backed adapter.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::{EngineError, Result};
use crate::domain::market::{MarketState, Position, User};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::transaction::Transaction;
use crate::ports::storage::Storage;

#[derive(Default)]
struct OrderTable {
    by_id: HashMap<String, Order>,
    /// nonce → order id, the unique index.
    by_nonce: HashMap<String, String>,
}

#[derive(Default)]
struct LedgerTable {
    /// Insertion-ordered, append-only.
    entries: Vec<Transaction>,
    nonces: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStorage {
    orders: RwLock<OrderTable>,
    ledger: RwLock<LedgerTable>,
    users: RwLock<HashMap<String, User>>,
    positions: RwLock<HashMap<(String, String), Position>>,
    markets: RwLock<HashMap<String, MarketState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledger entries across all users (test helper).
    pub async fn transaction_count(&self) -> usize {
        self.ledger.read().await.entries.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_order(&self, order: &Order) -> Result<Order> {
        let mut table = self.orders.write().await;
        if let Some(existing_id) = table.by_nonce.get(&order.nonce) {
            if existing_id != &order.id {
                return Err(EngineError::DuplicateNonce(order.nonce.clone()));
            }
        }
        table.by_nonce.insert(order.nonce.clone(), order.id.clone());
        table.by_id.insert(order.id.clone(), order.clone());
        Ok(order.clone())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut table = self.orders.write().await;
        table.by_nonce.insert(order.nonce.clone(), order.id.clone());
        table.by_id.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.by_id.get(order_id).cloned())
    }

    async fn find_order_by_nonce(&self, nonce: &str) -> Result<Option<Order>> {
        let table = self.orders.read().await;
        Ok(table
            .by_nonce
            .get(nonce)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn update_order_status_if(
        &self,
        order_id: &str,
        expected: &[OrderStatus],
        next: OrderStatus,
        now_ms: i64,
    ) -> Result<u64> {
        let mut table = self.orders.write().await;
        match table.by_id.get_mut(order_id) {
            Some(order) if expected.contains(&order.status) => {
                order.status = next;
                order.updated_at = now_ms;
                if next.is_terminal() {
                    order.completed_at = Some(now_ms);
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let mut ledger = self.ledger.write().await;
        if ledger.nonces.contains(&tx.nonce) {
            return Err(EngineError::DuplicateNonce(tx.nonce.clone()));
        }
        let mut stored = tx.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        ledger.nonces.insert(stored.nonce.clone());
        ledger.entries.push(stored.clone());
        Ok(stored)
    }

    async fn latest_transaction_for(&self, user_id: &str) -> Result<Option<Transaction>> {
        let ledger = self.ledger.read().await;
        // Insertion order breaks timestamp ties: scan keeps the last of
        // equal-timestamp entries.
        let mut latest: Option<&Transaction> = None;
        for tx in ledger.entries.iter().filter(|t| t.user_id == user_id) {
            match latest {
                Some(best) if best.timestamp > tx.timestamp => {}
                _ => latest = Some(tx),
            }
        }
        Ok(latest.cloned())
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .ledger
            .read()
            .await
            .entries
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.users
            .write()
            .await
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        self.positions.write().await.insert(
            (position.user_id.clone(), position.market_id.clone()),
            position.clone(),
        );
        Ok(())
    }

    async fn find_position(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Option<Position>> {
        Ok(self
            .positions
            .read()
            .await
            .get(&(user_id.to_string(), market_id.to_string()))
            .cloned())
    }

    async fn upsert_market(&self, market: &MarketState) -> Result<()> {
        self.markets
            .write()
            .await
            .insert(market.market_id.clone(), market.clone());
        Ok(())
    }

    async fn find_market(&self, market_id: &str) -> Result<Option<MarketState>> {
        Ok(self.markets.read().await.get(market_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::{OrderSide, OrderType, TradeRequest};

    fn order(nonce: &str) -> Order {
        let request = TradeRequest {
            user_id: "alice".to_string(),
            market_id: "m1".to_string(),
            outcome: "YES".to_string(),
            quantity: 5,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            nonce: None,
        };
        Order::from_request(nonce.to_string(), &request, 0)
    }

    #[tokio::test]
    async fn insert_order_enforces_unique_nonce() {
        let storage = MemoryStorage::new();
        storage.insert_order(&order("n1")).await.unwrap();

        let err = storage.insert_order(&order("n1")).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNonce(_)));

        // A different nonce is fine.
        storage.insert_order(&order("n2")).await.unwrap();
    }

    #[tokio::test]
    async fn find_by_nonce_round_trips() {
        let storage = MemoryStorage::new();
        let stored = storage.insert_order(&order("n1")).await.unwrap();
        let found = storage.find_order_by_nonce("n1").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert!(storage.find_order_by_nonce("n2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_update_honors_expected_set() {
        let storage = MemoryStorage::new();
        let mut o = order("n1");
        o.transition_to(OrderStatus::Open, 1).unwrap();
        storage.insert_order(&o).await.unwrap();

        let modified = storage
            .update_order_status_if(&o.id, &[OrderStatus::Open], OrderStatus::Cancelled, 2)
            .await
            .unwrap();
        assert_eq!(modified, 1);

        // Second attempt loses: the order is no longer OPEN.
        let modified = storage
            .update_order_status_if(&o.id, &[OrderStatus::Open], OrderStatus::Cancelled, 3)
            .await
            .unwrap();
        assert_eq!(modified, 0);

        let cancelled = storage.find_order(&o.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.completed_at, Some(2));
    }

    #[tokio::test]
    async fn ledger_append_assigns_id_and_keeps_order() {
        let storage = MemoryStorage::new();
        for (i, nonce) in ["a", "b", "c"].iter().enumerate() {
            let mut tx = Transaction::deposit(
                "alice",
                Money::of("1").unwrap(),
                (*nonce).to_string(),
                Money::from_int(i as i64 + 1),
                i as i64,
            );
            tx.id = String::new();
            let stored = storage.append_transaction(&tx).await.unwrap();
            assert!(!stored.id.is_empty());
        }

        let all = storage.transactions_for("alice").await.unwrap();
        let nonces: Vec<&str> = all.iter().map(|t| t.nonce.as_str()).collect();
        assert_eq!(nonces, vec!["a", "b", "c"]);
    }
}
