//! Order entity and lifecycle state machine.
//!
//! For market orders the lifecycle is NEW → OPEN → FILLED (instant fill
//! against the AMM). PARTIAL exists for future limit-order support and is
//! reachable only through OPEN. Terminal states are absorbing.
//!
//! The entity is the source of truth for order state; every transition goes
//! through [`Order::transition_to`] and is validated against the machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{EngineError, Result};
use super::money::Money;

/// Binary market outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// Case-insensitive parse; `None` for anything but YES/NO.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Order side. Only BUY is exercised in this MVP; SELL is declared for the
/// storage schema and rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. LIMIT is declared but rejected until an order book exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order lifecycle states.
///
/// Legal transitions:
/// - NEW → OPEN | REJECTED
/// - OPEN → PARTIAL | FILLED | CANCELLED | REJECTED
/// - PARTIAL → FILLED | CANCELLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Open,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal states allow no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Active orders can still be executed or cancelled.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Partial)
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            Self::New => matches!(to, Self::Open | Self::Rejected),
            Self::Open => matches!(
                to,
                Self::Partial | Self::Filled | Self::Cancelled | Self::Rejected
            ),
            Self::Partial => matches!(to, Self::Filled | Self::Cancelled),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Open => "OPEN",
            Self::Partial => "PARTIAL",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Incoming trade request as submitted at the boundary.
///
/// `outcome` stays a raw string until validation so malformed values reach
/// the validator and produce a proper rejection instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub user_id: String,
    pub market_id: String,
    pub outcome: String,
    pub quantity: u32,
    #[serde(default = "default_side")]
    pub side: OrderSide,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    /// Optional client-provided nonce for idempotency.
    #[serde(default)]
    pub nonce: Option<String>,
}

fn default_side() -> OrderSide {
    OrderSide::Buy
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

/// A user's intent to buy shares in a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Unique idempotency token. Format: `{userId}:{marketId}:{timestampMs}:{uuid}`.
    pub nonce: String,
    pub user_id: String,
    pub market_id: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    /// Canonical uppercase outcome string; validated against YES/NO.
    pub outcome: String,
    pub quantity: u32,
    pub filled_quantity: u32,
    /// Sum of all fill costs; debited from the user balance.
    pub total_cost: Option<Money>,
    /// `total_cost / filled_quantity`.
    pub average_fill_price: Option<Money>,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set exactly when a terminal state is entered.
    pub completed_at: Option<i64>,
    pub rejection_reason: Option<String>,
    /// Ledger entry that executed this order.
    pub transaction_id: Option<String>,
}

impl Order {
    /// Create a NEW order from a trade request.
    pub fn from_request(nonce: String, request: &TradeRequest, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nonce,
            user_id: request.user_id.clone(),
            market_id: request.market_id.clone(),
            order_type: request.order_type,
            side: request.side,
            outcome: request.outcome.trim().to_ascii_uppercase(),
            quantity: request.quantity,
            filled_quantity: 0,
            total_cost: None,
            average_fill_price: None,
            status: OrderStatus::New,
            created_at: now_ms,
            updated_at: now_ms,
            completed_at: None,
            rejection_reason: None,
            transaction_id: None,
        }
    }

    /// Transition to `next`, refreshing `updated_at` and stamping
    /// `completed_at` on terminal entry.
    pub fn transition_to(&mut self, next: OrderStatus, now_ms: i64) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now_ms;
        if next.is_terminal() {
            self.completed_at = Some(now_ms);
        }
        Ok(())
    }

    /// Reject the order. The only path that populates `rejection_reason`.
    pub fn reject(&mut self, reason: impl Into<String>, now_ms: i64) -> Result<()> {
        self.transition_to(OrderStatus::Rejected, now_ms)?;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    /// Record a fill and drive the status forward.
    ///
    /// Market orders fill completely, so this lands on FILLED; a partial
    /// fill of an OPEN order lands on PARTIAL instead.
    pub fn fill(&mut self, quantity: u32, fill_cost: Money, now_ms: i64) -> Result<()> {
        if quantity == 0 {
            return Err(EngineError::Execution(
                "fill quantity must be positive".to_string(),
            ));
        }
        if !fill_cost.is_positive() {
            return Err(EngineError::Execution(format!(
                "fill cost must be positive, got {fill_cost}"
            )));
        }

        let filled = self.filled_quantity + quantity;
        if filled > self.quantity {
            return Err(EngineError::Execution(format!(
                "overfill: {filled} > {}",
                self.quantity
            )));
        }

        self.filled_quantity = filled;
        let total = match self.total_cost {
            Some(existing) => existing.add(fill_cost)?,
            None => fill_cost,
        };
        self.total_cost = Some(total);
        self.average_fill_price = Some(total.divide(i64::from(self.filled_quantity))?);

        if self.filled_quantity == self.quantity {
            self.transition_to(OrderStatus::Filled, now_ms)
        } else {
            self.transition_to(OrderStatus::Partial, now_ms)
        }
    }

    pub fn remaining_quantity(&self) -> u32 {
        self.quantity - self.filled_quantity
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_request(quantity: u32) -> TradeRequest {
        TradeRequest {
            user_id: "alice".to_string(),
            market_id: "m1".to_string(),
            outcome: "yes".to_string(),
            quantity,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            nonce: None,
        }
    }

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!(Outcome::parse("yes"), Some(Outcome::Yes));
        assert_eq!(Outcome::parse(" NO "), Some(Outcome::No));
        assert_eq!(Outcome::parse("maybe"), None);
    }

    #[test]
    fn new_order_canonicalizes_outcome() {
        let order = Order::from_request("n1".to_string(), &buy_request(5), 1_000);
        assert_eq!(order.outcome, "YES");
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.filled_quantity, 0);
        assert!(order.completed_at.is_none());
    }

    #[test]
    fn legal_transitions_only() {
        use OrderStatus::*;
        let legal = [
            (New, Open),
            (New, Rejected),
            (Open, Partial),
            (Open, Filled),
            (Open, Cancelled),
            (Open, Rejected),
            (Partial, Filled),
            (Partial, Cancelled),
        ];
        let all = [New, Open, Partial, Filled, Cancelled, Rejected];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} expected {expected}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        use OrderStatus::*;
        for terminal in [Filled, Cancelled, Rejected] {
            for to in [New, Open, Partial, Filled, Cancelled, Rejected] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn illegal_transition_errors() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(5), 0);
        let err = order.transition_to(OrderStatus::Filled, 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalTransition {
                from: OrderStatus::New,
                to: OrderStatus::Filled
            }
        ));
    }

    #[test]
    fn completed_at_set_only_on_terminal() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(5), 0);
        order.transition_to(OrderStatus::Open, 10).unwrap();
        assert_eq!(order.updated_at, 10);
        assert!(order.completed_at.is_none());

        order.transition_to(OrderStatus::Cancelled, 20).unwrap();
        assert_eq!(order.completed_at, Some(20));
    }

    #[test]
    fn full_fill_reaches_filled_with_average_price() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(10), 0);
        order.transition_to(OrderStatus::Open, 1).unwrap();
        order.fill(10, Money::of("5.12494795").unwrap(), 2).unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, 10);
        assert_eq!(order.total_cost, Some(Money::of("5.12494795").unwrap()));
        assert_eq!(
            order.average_fill_price,
            Some(Money::of("0.51249480").unwrap())
        );
        assert_eq!(order.completed_at, Some(2));
    }

    #[test]
    fn partial_then_full_fill() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(10), 0);
        order.transition_to(OrderStatus::Open, 1).unwrap();
        order.fill(4, Money::of("2").unwrap(), 2).unwrap();
        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.remaining_quantity(), 6);

        order.fill(6, Money::of("3").unwrap(), 3).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.total_cost, Some(Money::of("5").unwrap()));
        assert_eq!(order.average_fill_price, Some(Money::of("0.5").unwrap()));
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(10), 0);
        order.transition_to(OrderStatus::Open, 1).unwrap();
        let err = order.fill(11, Money::of("5").unwrap(), 2).unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[test]
    fn reject_records_reason() {
        let mut order = Order::from_request("n1".to_string(), &buy_request(0), 0);
        order.reject("Quantity must be at least 1", 5).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(
            order.rejection_reason.as_deref(),
            Some("Quantity must be at least 1")
        );
        assert_eq!(order.completed_at, Some(5));
    }
}
