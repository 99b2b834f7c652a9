//! Domain layer - Core business logic and models.
//!
//! Pure types and functions for the prediction-market core: fixed-precision
//! money, LMSR pricing, the order lifecycle, ledger transactions, and market
//! state. No I/O and no external service dependencies here (hexagonal
//! architecture inner ring); everything is serializable and testable in
//! isolation.

pub mod error;
pub mod lmsr;
pub mod market;
pub mod money;
pub mod order;
pub mod transaction;

// Re-export core types for convenience
pub use error::{EngineError, Result};
pub use market::{MarketState, MarketStatus, Position, User};
pub use money::Money;
pub use order::{Order, OrderSide, OrderStatus, OrderType, Outcome, TradeRequest};
pub use transaction::{Transaction, TransactionType};
