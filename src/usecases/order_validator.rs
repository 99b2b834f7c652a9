//! Strict pre-execution order validation.
//!
//! Every order passes through here before it is accepted. Validation is
//! read-only, fails fast, and reports every violation it finds as an
//! ordered, human-readable list so the rejection reason is actionable.
//!
//! The balance check works from a cost ESTIMATE: `quantity × price × 1.10`.
//! The 10% slippage buffer deliberately overestimates so the authoritative
//! re-check at execution time stays strict.

use std::sync::Arc;

use tracing::warn;

use crate::domain::market::MarketState;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderSide, OrderType};
use crate::ports::storage::Storage;

use super::balance_service::BalanceService;

const MIN_QUANTITY: u32 = 1;
const MAX_QUANTITY: u32 = 1_000_000;
const MIN_COST: &str = "0.01";
const MAX_COST: &str = "1000000.00";

/// Result of order validation: either clean or an ordered error list.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }

    /// Errors joined in order, for the rejection reason.
    pub fn error_message(&self) -> String {
        self.errors.join("; ")
    }
}

pub struct OrderValidator<S: Storage> {
    balance_service: Arc<BalanceService<S>>,
}

impl<S: Storage> OrderValidator<S> {
    pub fn new(balance_service: Arc<BalanceService<S>>) -> Self {
        Self { balance_service }
    }

    /// Validate an order against the current market state. Side-effect-free.
    pub async fn validate(&self, order: &Order, market: &MarketState) -> ValidationResult {
        let mut errors = Vec::new();

        self.validate_fields(order, &mut errors);
        self.validate_market(market, &mut errors);
        self.validate_quantity(order, &mut errors);
        self.validate_outcome(order, &mut errors);
        self.validate_order_type(order, &mut errors);

        // Balance only once everything else is clean and this is a BUY.
        if errors.is_empty() && order.side == OrderSide::Buy {
            self.validate_balance(order, market, &mut errors).await;
        }

        if !errors.is_empty() {
            warn!(
                order_id = %order.id,
                user_id = %order.user_id,
                errors = ?errors,
                "Order validation failed"
            );
        }
        ValidationResult { errors }
    }

    fn validate_fields(&self, order: &Order, errors: &mut Vec<String>) {
        if order.user_id.trim().is_empty() {
            errors.push("userId is required".to_string());
        }
        if order.market_id.trim().is_empty() {
            errors.push("marketId is required".to_string());
        }
        if order.outcome.trim().is_empty() {
            errors.push("outcome is required".to_string());
        }
        if order.nonce.trim().is_empty() {
            errors.push("nonce is required for idempotency".to_string());
        }
    }

    fn validate_market(&self, market: &MarketState, errors: &mut Vec<String>) {
        if !market.is_open() {
            errors.push("Market is not open for trading".to_string());
        }
    }

    fn validate_quantity(&self, order: &Order, errors: &mut Vec<String>) {
        if order.quantity < MIN_QUANTITY {
            errors.push(format!("Quantity must be at least {MIN_QUANTITY}"));
        }
        if order.quantity > MAX_QUANTITY {
            errors.push(format!("Quantity cannot exceed {MAX_QUANTITY}"));
        }
    }

    fn validate_outcome(&self, order: &Order, errors: &mut Vec<String>) {
        let outcome = order.outcome.trim();
        if outcome.is_empty() {
            return; // already reported by validate_fields
        }
        if !outcome.eq_ignore_ascii_case("YES") && !outcome.eq_ignore_ascii_case("NO") {
            errors.push("Outcome must be YES or NO".to_string());
        }
    }

    fn validate_order_type(&self, order: &Order, errors: &mut Vec<String>) {
        if order.order_type != OrderType::Market {
            errors.push("Only MARKET orders are supported currently".to_string());
        }
        if order.side != OrderSide::Buy {
            errors.push("Only BUY orders are supported currently".to_string());
        }
    }

    async fn validate_balance(
        &self,
        order: &Order,
        market: &MarketState,
        errors: &mut Vec<String>,
    ) {
        let estimate = match Money::from_f64(estimate_order_cost(order, market)) {
            Ok(estimate) => estimate,
            Err(e) => {
                errors.push(format!("Failed to estimate order cost: {e}"));
                return;
            }
        };

        let min_cost = Money::of(MIN_COST).unwrap_or_else(|_| Money::zero());
        let max_cost = Money::of(MAX_COST).unwrap_or_else(|_| Money::zero());
        if !estimate.is_positive() {
            errors.push("Estimated order cost must be positive".to_string());
            return;
        }
        if estimate < min_cost {
            errors.push(format!("Order cost must be at least {min_cost}"));
            return;
        }
        if estimate > max_cost {
            errors.push(format!("Order cost cannot exceed {max_cost}"));
            return;
        }

        match self.balance_service.balance(&order.user_id).await {
            Ok(balance) => {
                if balance < estimate {
                    errors.push(format!(
                        "Insufficient balance: have {balance}, need ~{estimate}"
                    ));
                }
            }
            Err(e) => {
                errors.push(format!("Failed to validate balance: {e}"));
            }
        }
    }
}

/// Rough cost estimate for a BUY at the current price, plus a 10% slippage
/// buffer. The real LMSR cost is computed at execution time.
fn estimate_order_cost(order: &Order, market: &MarketState) -> f64 {
    let quantity = f64::from(order.quantity);
    if order.outcome.eq_ignore_ascii_case("YES") {
        quantity * market.current_price * 1.1
    } else {
        quantity * (1.0 - market.current_price) * 1.1
    }
}
