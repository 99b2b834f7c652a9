//! Ledger transaction entity.
//!
//! Transactions are append-only: once written they are never updated or
//! deleted. Each entry carries the running balance after itself, which makes
//! balance reads O(1) off the latest entry for a user.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::Result;
use super::money::Money;
use super::order::Outcome;

/// Kinds of monetary events recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    TradeBuy,
    TradeSell,
    Deposit,
    Withdrawal,
    MarketResolution,
}

/// A single ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Globally unique write token. Trade entries derive it from the order
    /// nonce as `{orderNonce}:tx`, making the ledger append idempotent.
    pub nonce: String,
    pub user_id: String,
    pub market_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed amount: positive credits, negative debits.
    pub amount: Money,
    pub outcome: Option<Outcome>,
    pub shares: Option<u32>,
    /// Average price per share at time of trade.
    pub price: Option<Money>,
    pub timestamp: i64,
    /// Running balance after this entry:
    /// `balance_after = previous balance_after + amount`.
    pub balance_after: Money,
}

impl Transaction {
    /// Debit entry for a completed AMM buy.
    pub fn trade_buy(
        user_id: &str,
        market_id: &str,
        outcome: Outcome,
        shares: u32,
        cost: Money,
        nonce: String,
        balance_after: Money,
        timestamp: i64,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            nonce,
            user_id: user_id.to_string(),
            market_id: Some(market_id.to_string()),
            transaction_type: TransactionType::TradeBuy,
            amount: cost.negate(),
            outcome: Some(outcome),
            shares: Some(shares),
            price: Some(cost.divide(i64::from(shares))?),
            timestamp,
            balance_after,
        })
    }

    /// Credit entry funding a user account.
    pub fn deposit(
        user_id: &str,
        amount: Money,
        nonce: String,
        balance_after: Money,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nonce,
            user_id: user_id.to_string(),
            market_id: None,
            transaction_type: TransactionType::Deposit,
            amount,
            outcome: None,
            shares: None,
            price: None,
            timestamp,
            balance_after,
        }
    }

    /// Debit entry for a withdrawal.
    pub fn withdrawal(
        user_id: &str,
        amount: Money,
        nonce: String,
        balance_after: Money,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nonce,
            user_id: user_id.to_string(),
            market_id: None,
            transaction_type: TransactionType::Withdrawal,
            amount: amount.negate(),
            outcome: None,
            shares: None,
            price: None,
            timestamp,
            balance_after,
        }
    }
}
