//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with the storage port to implement the
//! trade-execution pipeline:
//!
//! - `Ledger`: append-only transaction log, the source of truth for money
//! - `BalanceService`: O(1) balance reads, deposits, reconciliation
//! - `MarketStore` / `PositionStore`: hot caches with idle write-back
//! - `OrderValidator`: strict pre-execution checks
//! - `OrderExecutor`: the order lifecycle end to end
//! - `MarketDispatcher`: per-market serial execution lanes
//! - `TokenBucketRateLimiter`: admission control at the request boundary

pub mod balance_service;
pub mod ledger;
pub mod market_dispatcher;
pub mod market_store;
pub mod order_executor;
pub mod order_validator;
pub mod position_store;
pub mod rate_limiter;

pub use balance_service::{BalanceService, ReconcileReport};
pub use ledger::Ledger;
pub use market_dispatcher::MarketDispatcher;
pub use market_store::MarketStore;
pub use order_executor::OrderExecutor;
pub use order_validator::{OrderValidator, ValidationResult};
pub use position_store::PositionStore;
pub use rate_limiter::TokenBucketRateLimiter;
