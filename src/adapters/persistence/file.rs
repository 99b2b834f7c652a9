//! File-backed storage adapter.
//!
//! Two file formats, matching their collections' write patterns:
//!
//! - `ledger.jsonl` — append-only JSON Lines for transactions. Each line is
//!   a self-contained record, so the log streams, survives partial writes
//!   (a torn last line is skipped on load), and is the natural shape for an
//!   append-only ledger.
//! - `<collection>.json` — atomic JSON snapshots (write tmp, then rename)
//!   for orders, users, positions, and markets. The file is always either
//!   the old or the new version, never a partial write.
//!
//! An in-memory index mirrors the files and answers all reads; files are
//! only read once, at startup.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::error::{EngineError, Result};
use crate::domain::market::{MarketState, Position, User};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::transaction::Transaction;
use crate::ports::storage::Storage;

#[derive(Default)]
struct Tables {
    orders_by_id: HashMap<String, Order>,
    order_nonces: HashMap<String, String>,
    ledger: Vec<Transaction>,
    ledger_nonces: HashSet<String>,
    users: HashMap<String, User>,
    positions: HashMap<(String, String), Position>,
    markets: HashMap<String, MarketState>,
}

pub struct FileStorage {
    data_dir: PathBuf,
    ledger_path: PathBuf,
    tables: RwLock<Tables>,
}

impl FileStorage {
    /// Open (or initialize) a data directory and rebuild the index from it.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir).to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::Persistence(format!("create data dir: {e}")))?;

        let storage = Self {
            ledger_path: dir.join("ledger.jsonl"),
            data_dir: dir,
            tables: RwLock::new(Tables::default()),
        };
        storage.load().await?;
        Ok(storage)
    }

    async fn load(&self) -> Result<()> {
        let mut tables = self.tables.write().await;

        if self.ledger_path.exists() {
            let content = fs::read_to_string(&self.ledger_path)
                .await
                .map_err(|e| EngineError::Persistence(format!("read ledger: {e}")))?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Transaction>(line) {
                    Ok(tx) => {
                        tables.ledger_nonces.insert(tx.nonce.clone());
                        tables.ledger.push(tx);
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed ledger line");
                    }
                }
            }
        }

        for order in self.read_snapshot::<Order>("orders.json").await? {
            tables.order_nonces.insert(order.nonce.clone(), order.id.clone());
            tables.orders_by_id.insert(order.id.clone(), order);
        }
        for user in self.read_snapshot::<User>("users.json").await? {
            tables.users.insert(user.user_id.clone(), user);
        }
        for position in self.read_snapshot::<Position>("positions.json").await? {
            tables.positions.insert(
                (position.user_id.clone(), position.market_id.clone()),
                position,
            );
        }
        for market in self.read_snapshot::<MarketState>("markets.json").await? {
            tables.markets.insert(market.market_id.clone(), market);
        }

        info!(
            transactions = tables.ledger.len(),
            orders = tables.orders_by_id.len(),
            users = tables.users.len(),
            markets = tables.markets.len(),
            "Storage loaded"
        );
        Ok(())
    }

    async fn read_snapshot<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Vec<T>> {
        let path = self.data_dir.join(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::Persistence(format!("read {name}: {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| EngineError::Persistence(format!("parse {name}: {e}")))
    }

    /// Atomic snapshot write: tmp file, then rename over the target.
    async fn write_snapshot<T: serde::Serialize>(
        &self,
        name: &str,
        records: &[T],
    ) -> Result<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| EngineError::Persistence(format!("serialize {name}: {e}")))?;
        let path = self.data_dir.join(name);
        let tmp = self.data_dir.join(format!("{name}.tmp"));
        fs::write(&tmp, &json)
            .await
            .map_err(|e| EngineError::Persistence(format!("write {name}: {e}")))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::Persistence(format!("rename {name}: {e}")))?;
        Ok(())
    }

    async fn append_ledger_line(&self, tx: &Transaction) -> Result<()> {
        let mut json = serde_json::to_string(tx)
            .map_err(|e| EngineError::Persistence(format!("serialize tx: {e}")))?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)
            .await
            .map_err(|e| EngineError::Persistence(format!("open ledger: {e}")))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| EngineError::Persistence(format!("append ledger: {e}")))?;
        file.flush()
            .await
            .map_err(|e| EngineError::Persistence(format!("flush ledger: {e}")))?;
        Ok(())
    }

    async fn snapshot_orders(&self, tables: &Tables) -> Result<()> {
        let records: Vec<&Order> = tables.orders_by_id.values().collect();
        self.write_snapshot("orders.json", &records).await
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn insert_order(&self, order: &Order) -> Result<Order> {
        let mut tables = self.tables.write().await;
        if let Some(existing_id) = tables.order_nonces.get(&order.nonce) {
            if existing_id != &order.id {
                return Err(EngineError::DuplicateNonce(order.nonce.clone()));
            }
        }
        tables
            .order_nonces
            .insert(order.nonce.clone(), order.id.clone());
        tables.orders_by_id.insert(order.id.clone(), order.clone());
        self.snapshot_orders(&tables).await?;
        Ok(order.clone())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .order_nonces
            .insert(order.nonce.clone(), order.id.clone());
        tables.orders_by_id.insert(order.id.clone(), order.clone());
        self.snapshot_orders(&tables).await
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders_by_id.get(order_id).cloned())
    }

    async fn find_order_by_nonce(&self, nonce: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .order_nonces
            .get(nonce)
            .and_then(|id| tables.orders_by_id.get(id))
            .cloned())
    }

    async fn update_order_status_if(
        &self,
        order_id: &str,
        expected: &[OrderStatus],
        next: OrderStatus,
        now_ms: i64,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let modified = match tables.orders_by_id.get_mut(order_id) {
            Some(order) if expected.contains(&order.status) => {
                order.status = next;
                order.updated_at = now_ms;
                if next.is_terminal() {
                    order.completed_at = Some(now_ms);
                }
                1
            }
            _ => 0,
        };
        if modified == 1 {
            self.snapshot_orders(&tables).await?;
        }
        Ok(modified)
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let mut tables = self.tables.write().await;
        if tables.ledger_nonces.contains(&tx.nonce) {
            return Err(EngineError::DuplicateNonce(tx.nonce.clone()));
        }
        let mut stored = tx.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        // File first: an entry in the index but not on disk would vanish on
        // restart and break the running-balance chain.
        self.append_ledger_line(&stored).await?;
        tables.ledger_nonces.insert(stored.nonce.clone());
        tables.ledger.push(stored.clone());
        Ok(stored)
    }

    async fn latest_transaction_for(&self, user_id: &str) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        let mut latest: Option<&Transaction> = None;
        for tx in tables.ledger.iter().filter(|t| t.user_id == user_id) {
            match latest {
                Some(best) if best.timestamp > tx.timestamp => {}
                _ => latest = Some(tx),
            }
        }
        Ok(latest.cloned())
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .tables
            .read()
            .await
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.user_id.clone(), user.clone());
        let records: Vec<&User> = tables.users.values().collect();
        self.write_snapshot("users.json", &records).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.positions.insert(
            (position.user_id.clone(), position.market_id.clone()),
            position.clone(),
        );
        let records: Vec<&Position> = tables.positions.values().collect();
        self.write_snapshot("positions.json", &records).await
    }

    async fn find_position(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Option<Position>> {
        Ok(self
            .tables
            .read()
            .await
            .positions
            .get(&(user_id.to_string(), market_id.to_string()))
            .cloned())
    }

    async fn upsert_market(&self, market: &MarketState) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .markets
            .insert(market.market_id.clone(), market.clone());
        let records: Vec<&MarketState> = tables.markets.values().collect();
        self.write_snapshot("markets.json", &records).await
    }

    async fn find_market(&self, market_id: &str) -> Result<Option<MarketState>> {
        Ok(self.tables.read().await.markets.get(market_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;

    fn temp_dir() -> String {
        std::env::temp_dir()
            .join(format!("lmsr-engine-test-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn ledger_survives_restart() {
        let dir = temp_dir();

        {
            let storage = FileStorage::open(&dir).await.unwrap();
            storage
                .append_transaction(&Transaction::deposit(
                    "alice",
                    Money::of("100").unwrap(),
                    "d1".to_string(),
                    Money::of("100").unwrap(),
                    1,
                ))
                .await
                .unwrap();
        }

        let reopened = FileStorage::open(&dir).await.unwrap();
        let latest = reopened.latest_transaction_for("alice").await.unwrap().unwrap();
        assert_eq!(latest.balance_after, Money::of("100").unwrap());

        // The nonce index was rebuilt: replays still conflict.
        let err = reopened
            .append_transaction(&Transaction::deposit(
                "alice",
                Money::of("100").unwrap(),
                "d1".to_string(),
                Money::of("200").unwrap(),
                2,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNonce(_)));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn snapshots_survive_restart() {
        let dir = temp_dir();

        {
            let storage = FileStorage::open(&dir).await.unwrap();
            storage
                .upsert_market(&MarketState::new("m1", 100.0))
                .await
                .unwrap();
            let mut position = Position::new("alice", "m1");
            position.yes_shares = 12;
            storage.upsert_position(&position).await.unwrap();
        }

        let reopened = FileStorage::open(&dir).await.unwrap();
        assert!(reopened.find_market("m1").await.unwrap().is_some());
        let position = reopened
            .find_position("alice", "m1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.yes_shares, 12);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn torn_ledger_line_is_skipped() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await.unwrap();
        let good = serde_json::to_string(&Transaction::deposit(
            "alice",
            Money::of("5").unwrap(),
            "d1".to_string(),
            Money::of("5").unwrap(),
            1,
        ))
        .unwrap();
        fs::write(
            Path::new(&dir).join("ledger.jsonl"),
            format!("{good}\n{{\"truncated"),
        )
        .await
        .unwrap();

        let storage = FileStorage::open(&dir).await.unwrap();
        assert_eq!(storage.transactions_for("alice").await.unwrap().len(), 1);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
