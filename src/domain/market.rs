//! Market state, user positions, and the cached user record.

use serde::{Deserialize, Serialize};

use super::lmsr;
use super::money::Money;
use super::order::Outcome;

/// Market trading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    Resolved,
}

/// Live state of a binary market's AMM.
///
/// Mutated only under the market's serial execution lane. The share pools
/// and `current_price` always satisfy
/// `current_price == lmsr::price(yes_shares, no_shares, liquidity_b)`
/// after every applied trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub market_id: String,
    pub yes_shares: f64,
    pub no_shares: f64,
    /// LMSR liquidity parameter; constant for the market's lifetime.
    pub liquidity_b: f64,
    pub current_price: f64,
    pub status: MarketStatus,
    /// Last trade applied (epoch ms). Updated by the executor.
    pub last_trade_timestamp: i64,
    /// Last durable write (epoch ms). Updated by the idle flush.
    pub last_persisted_timestamp: i64,
}

impl MarketState {
    /// Fresh market with empty pools, priced at the LMSR midpoint.
    pub fn new(market_id: impl Into<String>, liquidity_b: f64) -> Self {
        Self {
            market_id: market_id.into(),
            yes_shares: 0.0,
            no_shares: 0.0,
            liquidity_b,
            current_price: lmsr::price(0.0, 0.0, liquidity_b),
            status: MarketStatus::Open,
            last_trade_timestamp: 0,
            last_persisted_timestamp: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MarketStatus::Open
    }

    /// Apply a fill to the matching pool and reprice.
    pub fn apply_trade(&mut self, outcome: Outcome, quantity: u32, now_ms: i64) {
        match outcome {
            Outcome::Yes => self.yes_shares += f64::from(quantity),
            Outcome::No => self.no_shares += f64::from(quantity),
        }
        self.last_trade_timestamp = now_ms;
        self.current_price =
            lmsr::price(self.yes_shares, self.no_shares, self.liquidity_b);
    }

    /// Idle-flush condition: quiet for longer than the threshold and the
    /// latest trade is not yet durable.
    pub fn needs_flush(&self, now_ms: i64, idle_threshold_ms: i64) -> bool {
        now_ms - self.last_trade_timestamp > idle_threshold_ms
            && self.last_persisted_timestamp < self.last_trade_timestamp
    }
}

/// A user's share holdings in one market. Mutated only by the executor on a
/// successful fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub user_id: String,
    pub market_id: String,
    pub yes_shares: u64,
    pub no_shares: u64,
}

impl Position {
    pub fn new(user_id: impl Into<String>, market_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            market_id: market_id.into(),
            yes_shares: 0,
            no_shares: 0,
        }
    }

    pub fn add_shares(&mut self, outcome: Outcome, quantity: u32) {
        match outcome {
            Outcome::Yes => self.yes_shares += u64::from(quantity),
            Outcome::No => self.no_shares += u64::from(quantity),
        }
    }

    pub fn shares(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Yes => self.yes_shares,
            Outcome::No => self.no_shares,
        }
    }
}

/// User record. `balance` is CACHED and DERIVED from the ledger: refreshed
/// asynchronously, reconciled periodically, and never the input to a money
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub balance: Money,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: Money::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_market_prices_at_midpoint() {
        let market = MarketState::new("m1", 100.0);
        assert!((market.current_price - 0.5).abs() < 1e-9);
        assert!(market.is_open());
    }

    #[test]
    fn apply_trade_moves_pool_and_price() {
        let mut market = MarketState::new("m1", 100.0);
        market.apply_trade(Outcome::Yes, 10, 42);

        assert_eq!(market.yes_shares, 10.0);
        assert_eq!(market.no_shares, 0.0);
        assert_eq!(market.last_trade_timestamp, 42);
        let expected = lmsr::price(10.0, 0.0, 100.0);
        assert!((market.current_price - expected).abs() < 1e-12);
    }

    #[test]
    fn needs_flush_requires_idle_and_unpersisted() {
        let mut market = MarketState::new("m1", 100.0);
        market.apply_trade(Outcome::No, 1, 1_000);

        // Still hot: trade 500ms ago.
        assert!(!market.needs_flush(1_500, 1_000));
        // Idle and unpersisted.
        assert!(market.needs_flush(2_500, 1_000));
        // Idle but already persisted.
        market.last_persisted_timestamp = 2_500;
        assert!(!market.needs_flush(3_500, 1_000));
    }

    #[test]
    fn position_accumulates_per_outcome() {
        let mut position = Position::new("alice", "m1");
        position.add_shares(Outcome::Yes, 10);
        position.add_shares(Outcome::No, 3);
        position.add_shares(Outcome::Yes, 2);
        assert_eq!(position.shares(Outcome::Yes), 12);
        assert_eq!(position.shares(Outcome::No), 3);
    }
}
