//! Storage port - durable persistence contract.
//!
//! One trait covering the five collections the engine persists. Any engine
//! that provides these semantics is acceptable; the contract is what the
//! core relies on, not a particular driver:
//!
//! - `orders`: upsert by id, unique index on nonce, atomic conditional
//!   status update returning a modified-count.
//! - `transactions`: insert-only with a unique nonce index; `latest` is
//!   expected to be cheap (indexed on `(user_id, timestamp desc)`).
//! - `users` / `positions` / `markets`: plain upserts by their keys.
//!
//! Adapters surface duplicate-key conflicts as the typed
//! [`EngineError::DuplicateNonce`] so callers never inspect driver error
//! text.

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::market::{MarketState, Position, User};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::transaction::Transaction;

/// Durable storage for orders, the ledger, and the cached entity records.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // ── orders ──────────────────────────────────────────────

    /// Insert a new order. Fails with `DuplicateNonce` if another order
    /// already holds this nonce; performs no mutation in that case.
    async fn insert_order(&self, order: &Order) -> Result<Order>;

    /// Upsert an existing order by id.
    async fn update_order(&self, order: &Order) -> Result<()>;

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>>;

    async fn find_order_by_nonce(&self, nonce: &str) -> Result<Option<Order>>;

    /// Atomically set `status = next` iff the current status is in
    /// `expected`. Returns the number of modified orders (0 or 1); 0 means
    /// the caller lost a race.
    async fn update_order_status_if(
        &self,
        order_id: &str,
        expected: &[OrderStatus],
        next: OrderStatus,
        now_ms: i64,
    ) -> Result<u64>;

    // ── transactions (the ledger) ───────────────────────────

    /// Insert-only append. Atomic: on a unique-nonce conflict fails with
    /// `DuplicateNonce` and writes nothing. Entries are never updated or
    /// deleted.
    async fn append_transaction(&self, tx: &Transaction) -> Result<Transaction>;

    /// Highest-timestamp entry for the user (insertion order breaks ties),
    /// or `None` if the user has no history.
    async fn latest_transaction_for(&self, user_id: &str) -> Result<Option<Transaction>>;

    /// All entries for the user in insertion order. Reconciliation only;
    /// not a hot path.
    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>>;

    // ── users ───────────────────────────────────────────────

    async fn upsert_user(&self, user: &User) -> Result<()>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn all_users(&self) -> Result<Vec<User>>;

    // ── positions ───────────────────────────────────────────

    async fn upsert_position(&self, position: &Position) -> Result<()>;

    async fn find_position(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Option<Position>>;

    // ── markets ─────────────────────────────────────────────

    async fn upsert_market(&self, market: &MarketState) -> Result<()>;

    async fn find_market(&self, market_id: &str) -> Result<Option<MarketState>>;
}
