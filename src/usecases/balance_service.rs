//! Balance reads, deposits/withdrawals, and cache reconciliation.
//!
//! The ledger is the source of truth: `balance` reads the `balance_after`
//! of the user's latest entry (O(1)). The `User.balance` field in storage
//! is a derived cache refreshed asynchronously after trades and reconciled
//! periodically against a full ledger scan.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::{EngineError, Result};
use crate::domain::market::User;
use crate::domain::money::Money;
use crate::domain::transaction::Transaction;
use crate::ports::storage::Storage;

use super::ledger::Ledger;

/// Outcome of a reconciliation sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    /// Users checked.
    pub checked: usize,
    /// Users whose cached balance drifted and was overwritten.
    pub corrected: usize,
}

/// Ledger-backed balance service.
pub struct BalanceService<S: Storage> {
    storage: Arc<S>,
    ledger: Arc<Ledger<S>>,
    /// Cached balances within this distance of the ledger sum are left alone.
    drift_tolerance: Money,
}

impl<S: Storage> BalanceService<S> {
    pub fn new(storage: Arc<S>, ledger: Arc<Ledger<S>>, drift_tolerance: Money) -> Self {
        Self {
            storage,
            ledger,
            drift_tolerance,
        }
    }

    /// Authoritative balance: `balance_after` of the latest ledger entry,
    /// or zero for a user with no history.
    pub async fn balance(&self, user_id: &str) -> Result<Money> {
        Ok(self
            .ledger
            .latest_for(user_id)
            .await?
            .map(|tx| tx.balance_after)
            .unwrap_or_else(Money::zero))
    }

    pub async fn has_sufficient_balance(&self, user_id: &str, amount: Money) -> Result<bool> {
        Ok(self.balance(user_id).await? >= amount)
    }

    /// Balance by summing every entry. O(n); reconciliation and audit only.
    pub async fn balance_full_scan(&self, user_id: &str) -> Result<Money> {
        let mut balance = Money::zero();
        for tx in self.ledger.scan_for(user_id).await? {
            balance = balance.add(tx.amount)?;
        }
        Ok(balance)
    }

    /// Credit a user account. The only money inlet besides resolution
    /// payouts; appends a DEPOSIT entry under the running-balance contract.
    #[instrument(skip(self, amount), fields(user_id = %user_id, amount = %amount))]
    pub async fn deposit(&self, user_id: &str, amount: Money) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(format!(
                "deposit amount must be positive, got {amount}"
            )));
        }
        let now = Utc::now().timestamp_millis();
        let nonce = format!("{user_id}:deposit:{now}:{}", Uuid::new_v4());
        let balance_after = self.balance(user_id).await?.add(amount)?;
        let stored = self
            .ledger
            .append(Transaction::deposit(user_id, amount, nonce, balance_after, now))
            .await?;

        self.write_cached_balance(user_id, stored.balance_after).await?;
        Ok(stored)
    }

    /// Debit a user account. Requires sufficient balance.
    #[instrument(skip(self, amount), fields(user_id = %user_id, amount = %amount))]
    pub async fn withdraw(&self, user_id: &str, amount: Money) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(format!(
                "withdrawal amount must be positive, got {amount}"
            )));
        }
        let balance = self.balance(user_id).await?;
        if balance < amount {
            return Err(EngineError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }
        let now = Utc::now().timestamp_millis();
        let nonce = format!("{user_id}:withdraw:{now}:{}", Uuid::new_v4());
        let balance_after = balance.subtract(amount)?;
        let stored = self
            .ledger
            .append(Transaction::withdrawal(user_id, amount, nonce, balance_after, now))
            .await?;

        self.write_cached_balance(user_id, stored.balance_after).await?;
        Ok(stored)
    }

    /// Refresh the cached `User.balance` from the ledger. Called
    /// asynchronously after trades. Failures are logged, never propagated:
    /// the cache heals at the next reconciliation.
    pub async fn recompute_and_update(&self, user_id: &str) {
        match self.balance(user_id).await {
            Ok(balance) => {
                if let Err(e) = self.write_cached_balance(user_id, balance).await {
                    error!(user_id = %user_id, error = %e, "Failed to update cached balance");
                } else {
                    debug!(user_id = %user_id, balance = %balance, "Cached balance recomputed");
                }
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to recompute balance");
            }
        }
    }

    /// Periodic reconciliation: for every known user, fully scan the ledger
    /// and overwrite the cached balance when it drifts beyond tolerance.
    /// Never mutates the ledger.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let users = self.storage.all_users().await?;
        let mut report = ReconcileReport::default();

        for user in users {
            report.checked += 1;
            let ledger_balance = match self.balance_full_scan(&user.user_id).await {
                Ok(b) => b,
                Err(e) => {
                    error!(user_id = %user.user_id, error = %e, "Reconciliation scan failed");
                    continue;
                }
            };

            let drift = user.balance.subtract(ledger_balance)?.abs();
            if drift > self.drift_tolerance {
                warn!(
                    user_id = %user.user_id,
                    cached = %user.balance,
                    ledger = %ledger_balance,
                    drift = %drift,
                    "Balance drift detected, overwriting cache"
                );
                self.write_cached_balance(&user.user_id, ledger_balance)
                    .await?;
                report.corrected += 1;
            }
        }

        info!(
            checked = report.checked,
            corrected = report.corrected,
            "Balance reconciliation complete"
        );
        Ok(report)
    }

    async fn write_cached_balance(&self, user_id: &str, balance: Money) -> Result<()> {
        let mut user = self
            .storage
            .find_user(user_id)
            .await?
            .unwrap_or_else(|| User::new(user_id));
        user.balance = balance;
        self.storage.upsert_user(&user).await
    }
}
