//! End-to-end order execution.
//!
//! Order flow (market orders):
//! 1. Derive the idempotency nonce (client-provided or generated)
//! 2. Replay check: an existing order with this nonce is returned unchanged
//! 3. Persist the order in NEW status (establishes nonce uniqueness)
//! 4. Load market state; reject if the market does not exist
//! 5. Strict validation; reject on failure
//! 6. Transition NEW → OPEN
//! 7. Execute against the AMM: authoritative balance re-check, ledger-first
//!    append, fill, market/position cache updates, async balance recompute
//!
//! The ledger append is the commit point. A `DuplicateNonce` there means a
//! prior attempt already executed: the executor logs and returns the prior
//! order without touching the caches again. Everything before the append
//! leaves money untouched, so rejections are always clean.
//!
//! Instances are driven by the per-market dispatcher lanes, which serialize
//! execution within a market; nothing here takes an in-process lock for
//! money.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::{EngineError, Result};
use crate::domain::lmsr;
use crate::domain::market::MarketState;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus, Outcome, TradeRequest};
use crate::domain::transaction::Transaction;
use crate::ports::storage::Storage;

use super::balance_service::BalanceService;
use super::ledger::Ledger;
use super::market_store::MarketStore;
use super::order_validator::OrderValidator;
use super::position_store::PositionStore;

pub struct OrderExecutor<S: Storage> {
    storage: Arc<S>,
    ledger: Arc<Ledger<S>>,
    balance_service: Arc<BalanceService<S>>,
    validator: Arc<OrderValidator<S>>,
    market_store: Arc<MarketStore<S>>,
    position_store: Arc<PositionStore<S>>,
}

impl<S: Storage> OrderExecutor<S> {
    pub fn new(
        storage: Arc<S>,
        ledger: Arc<Ledger<S>>,
        balance_service: Arc<BalanceService<S>>,
        validator: Arc<OrderValidator<S>>,
        market_store: Arc<MarketStore<S>>,
        position_store: Arc<PositionStore<S>>,
    ) -> Self {
        Self {
            storage,
            ledger,
            balance_service,
            validator,
            market_store,
            position_store,
        }
    }

    /// Execute a market buy. Idempotent on the request nonce: replays
    /// return the original order and leave all state untouched.
    #[instrument(skip(self, request), fields(
        user_id = %request.user_id,
        market_id = %request.market_id,
        quantity = request.quantity,
    ))]
    pub async fn execute_market_order(&self, request: &TradeRequest) -> Result<Order> {
        let now = Utc::now().timestamp_millis();
        let nonce = request.nonce.clone().unwrap_or_else(|| {
            format!(
                "{}:{}:{}:{}",
                request.user_id,
                request.market_id,
                now,
                Uuid::new_v4()
            )
        });

        // Idempotency check: return the existing order on a duplicate nonce.
        if let Some(existing) = self.storage.find_order_by_nonce(&nonce).await? {
            info!(nonce = %nonce, order_id = %existing.id, "Duplicate order request, returning existing order");
            return Ok(existing);
        }

        let mut order = Order::from_request(nonce, request, now);
        order = match self.storage.insert_order(&order).await {
            Ok(stored) => stored,
            Err(EngineError::DuplicateNonce(_)) => {
                // Race: another worker created the order between our lookup
                // and insert. The stored order wins.
                info!(nonce = %order.nonce, "Race on order creation, fetching existing order");
                return self
                    .storage
                    .find_order_by_nonce(&order.nonce)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Persistence(format!(
                            "order with nonce {} vanished after duplicate-key insert",
                            order.nonce
                        ))
                    });
            }
            Err(e) => return Err(e),
        };

        let Some(market) = self.market_store.get_or_load(&order.market_id).await? else {
            let reason = format!("Market not found: {}", order.market_id);
            self.reject(&mut order, &reason).await?;
            return Err(EngineError::MarketNotFound(order.market_id));
        };

        let validation = self.validator.validate(&order, &market).await;
        if !validation.is_valid() {
            let reason = validation.error_message();
            self.reject(&mut order, &reason).await?;
            return Err(EngineError::Validation(validation.into_errors()));
        }

        order.transition_to(OrderStatus::Open, Utc::now().timestamp_millis())?;
        self.storage.update_order(&order).await?;

        match self.execute(&mut order, &market).await {
            Ok(executed) => Ok(executed),
            Err(e @ EngineError::InsufficientBalance { .. }) => {
                self.reject(&mut order, "Insufficient balance at execution time")
                    .await?;
                Err(e)
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Order execution failed");
                self.reject(&mut order, &format!("Execution failed: {e}"))
                    .await?;
                Err(EngineError::Execution(e.to_string()))
            }
        }
    }

    /// Execute an OPEN order against the AMM.
    async fn execute(&self, order: &mut Order, market: &MarketState) -> Result<Order> {
        let outcome = Outcome::parse(&order.outcome).ok_or_else(|| {
            EngineError::Execution(format!("unparseable outcome: {}", order.outcome))
        })?;

        // Ensure the cached user and position exist before mutating them.
        self.position_store.get_or_create_user(&order.user_id).await?;
        self.position_store
            .get_or_create_position(&order.user_id, &order.market_id)
            .await?;

        let cost = Money::from_f64(lmsr::compute_cost(
            market.yes_shares,
            market.no_shares,
            outcome,
            f64::from(order.quantity),
            market.liquidity_b,
        ))?;

        // Authoritative balance check against the ledger. The validator's
        // estimate may have been optimistic.
        let balance = self.balance_service.balance(&order.user_id).await?;
        if balance < cost {
            return Err(EngineError::InsufficientBalance {
                have: balance,
                need: cost,
            });
        }

        let now = Utc::now().timestamp_millis();
        let balance_after = balance.subtract(cost)?;
        let tx = Transaction::trade_buy(
            &order.user_id,
            &order.market_id,
            outcome,
            order.quantity,
            cost,
            format!("{}:tx", order.nonce),
            balance_after,
            now,
        )?;

        // ATOMIC LEDGER APPEND: the commit point for this trade.
        let stored_tx = match self.ledger.append(tx).await {
            Ok(stored) => stored,
            Err(EngineError::DuplicateNonce(nonce)) => {
                // The trade already committed on a prior attempt. Leave the
                // caches alone; the stored order reflects the fill.
                warn!(
                    order_id = %order.id,
                    nonce = %nonce,
                    "Ledger entry already exists, order previously executed"
                );
                let prior = self
                    .storage
                    .find_order_by_nonce(&order.nonce)
                    .await?
                    .unwrap_or_else(|| order.clone());
                return Ok(prior);
            }
            Err(e) => return Err(e),
        };

        order.fill(order.quantity, cost, now)?;
        order.transaction_id = Some(stored_tx.id.clone());
        self.storage.update_order(order).await?;

        // Hot-path cache updates: share pools, price, position.
        self.market_store
            .record_trade(&order.market_id, outcome, order.quantity, now)
            .await?;
        self.position_store
            .apply_fill(&order.user_id, &order.market_id, outcome, order.quantity, now)
            .await?;

        // Refresh the cached User.balance off the hot path.
        let balance_service = Arc::clone(&self.balance_service);
        let user_id = order.user_id.clone();
        tokio::spawn(async move {
            balance_service.recompute_and_update(&user_id).await;
        });

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            market_id = %order.market_id,
            outcome = %order.outcome,
            quantity = order.quantity,
            cost = %cost,
            balance_after = %balance_after,
            "Order executed"
        );
        Ok(order.clone())
    }

    /// Cancel an active order via an atomic conditional update.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: &str, by_user_id: &str) -> Result<()> {
        let order = self
            .storage
            .find_order(order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        if order.user_id != by_user_id {
            return Err(EngineError::NotAuthorized(
                "cannot cancel an order owned by a different user".to_string(),
            ));
        }
        if !order.is_active() {
            return Err(EngineError::NotActive(order.status));
        }

        let now = Utc::now().timestamp_millis();
        let modified = self
            .storage
            .update_order_status_if(
                order_id,
                &[OrderStatus::Open, OrderStatus::Partial],
                OrderStatus::Cancelled,
                now,
            )
            .await?;
        if modified == 0 {
            return Err(EngineError::RaceLost(
                "order state changed during cancel".to_string(),
            ));
        }

        info!(order_id = %order_id, user_id = %by_user_id, "Order cancelled");
        Ok(())
    }

    async fn reject(&self, order: &mut Order, reason: &str) -> Result<()> {
        warn!(
            order_id = %order.id,
            user_id = %order.user_id,
            reason = %reason,
            "Order rejected"
        );
        order.reject(reason, Utc::now().timestamp_millis())?;
        self.storage.update_order(order).await
    }
}
