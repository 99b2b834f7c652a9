//! Error taxonomy for the trade-execution core.
//!
//! Every failure the engine can produce is a tagged variant here, so the
//! executor's happy path reads linearly and callers branch on kinds instead
//! of parsing message text. Duplicate-key detection in particular is typed
//! (`DuplicateNonce`) rather than matched against driver error strings.

use thiserror::Error;

use super::money::Money;
use super::order::OrderStatus;

/// Central error enum for all engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed, empty, or non-finite monetary input.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Monetary arithmetic failure (division by zero, overflow).
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Order failed validation. Carries the ordered error list.
    #[error("Order validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The requested market does not exist.
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Ledger balance does not cover the trade at execution time.
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Money, need: Money },

    /// A write with this nonce already exists (idempotency conflict).
    #[error("Duplicate nonce: {0}")]
    DuplicateNonce(String),

    /// Order state machine rejected the transition.
    #[error("Invalid order state transition: {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    /// The requested order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Caller does not own the target order.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Order is in a terminal or not-yet-open state and cannot be acted on.
    #[error("Order is not active: {0}")]
    NotActive(OrderStatus),

    /// A conditional storage update matched zero documents.
    #[error("Lost update race: {0}")]
    RaceLost(String),

    /// Unexpected failure inside order execution.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Request rejected by the token-bucket rate limiter.
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Durable storage failed on a non-ledger write.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_joins_errors_in_order() {
        let err = EngineError::Validation(vec![
            "userId is required".to_string(),
            "Quantity must be at least 1".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Order validation failed: userId is required; Quantity must be at least 1"
        );
    }

    #[test]
    fn illegal_transition_names_both_states() {
        let err = EngineError::IllegalTransition {
            from: OrderStatus::Filled,
            to: OrderStatus::Open,
        };
        let msg = err.to_string();
        assert!(msg.contains("FILLED"));
        assert!(msg.contains("OPEN"));
    }
}
