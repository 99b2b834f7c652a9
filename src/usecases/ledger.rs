//! Append-only transaction ledger.
//!
//! The ledger is the SOURCE OF TRUTH for all balances. Appends are atomic
//! at the storage layer and deduplicated by the unique transaction nonce;
//! no in-process lock is taken for money. Entries carry a running
//! `balance_after`, so the latest entry answers a balance query in O(1).

use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::error::Result;
use crate::domain::transaction::Transaction;
use crate::ports::storage::Storage;

/// Thin ordering-and-dedup façade over the transaction collection.
pub struct Ledger<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Durably insert a transaction.
    ///
    /// Fails with `DuplicateNonce` (and writes nothing) if an entry with
    /// this nonce already exists; the caller decides whether that means
    /// "already executed" (trade replay) or a genuine conflict.
    #[instrument(skip(self, tx), fields(nonce = %tx.nonce, user_id = %tx.user_id))]
    pub async fn append(&self, tx: Transaction) -> Result<Transaction> {
        let stored = self.storage.append_transaction(&tx).await?;
        info!(
            tx_id = %stored.id,
            amount = %stored.amount,
            balance_after = %stored.balance_after,
            "Ledger entry appended"
        );
        Ok(stored)
    }

    /// Latest entry for the user, or `None` if there is no history.
    pub async fn latest_for(&self, user_id: &str) -> Result<Option<Transaction>> {
        self.storage.latest_transaction_for(user_id).await
    }

    /// Full history for the user in insertion order (reconciliation only).
    pub async fn scan_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        self.storage.transactions_for(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory::MemoryStorage;
    use crate::domain::error::EngineError;
    use crate::domain::money::Money;

    fn deposit(user: &str, amount: &str, nonce: &str, after: &str, ts: i64) -> Transaction {
        Transaction::deposit(
            user,
            Money::of(amount).unwrap(),
            nonce.to_string(),
            Money::of(after).unwrap(),
            ts,
        )
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let ledger = Ledger::new(Arc::new(MemoryStorage::new()));
        ledger
            .append(deposit("alice", "100", "d1", "100", 1))
            .await
            .unwrap();
        ledger
            .append(deposit("alice", "50", "d2", "150", 2))
            .await
            .unwrap();

        let latest = ledger.latest_for("alice").await.unwrap().unwrap();
        assert_eq!(latest.balance_after, Money::of("150").unwrap());

        let all = ledger.scan_for("alice").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].nonce, "d1");
        assert_eq!(all[1].nonce, "d2");
    }

    #[tokio::test]
    async fn duplicate_nonce_is_rejected_without_mutation() {
        let ledger = Ledger::new(Arc::new(MemoryStorage::new()));
        ledger
            .append(deposit("alice", "100", "d1", "100", 1))
            .await
            .unwrap();

        let err = ledger
            .append(deposit("alice", "100", "d1", "200", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNonce(_)));

        let all = ledger.scan_for("alice").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].balance_after, Money::of("100").unwrap());
    }

    #[tokio::test]
    async fn latest_breaks_timestamp_ties_by_insertion_order() {
        let ledger = Ledger::new(Arc::new(MemoryStorage::new()));
        ledger
            .append(deposit("alice", "10", "d1", "10", 5))
            .await
            .unwrap();
        ledger
            .append(deposit("alice", "10", "d2", "20", 5))
            .await
            .unwrap();

        let latest = ledger.latest_for("alice").await.unwrap().unwrap();
        assert_eq!(latest.nonce, "d2");
    }

    #[tokio::test]
    async fn empty_history_reads_none() {
        let ledger = Ledger::new(Arc::new(MemoryStorage::new()));
        assert!(ledger.latest_for("nobody").await.unwrap().is_none());
        assert!(ledger.scan_for("nobody").await.unwrap().is_empty());
    }
}
