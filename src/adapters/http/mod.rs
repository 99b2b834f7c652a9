//! HTTP boundary: router, handlers, and rate-limit middleware.
//!
//! Authentication is a collaborator, not implemented here: the auth layer
//! in front of this service is expected to verify the caller and set
//! `X-User-Id`. This module keys rate limiting off that principal, maps
//! engine errors onto status codes, and forwards accepted trades to the
//! per-market dispatcher.

pub mod handlers;
pub mod rate_limit;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;

use crate::adapters::metrics::EngineMetrics;
use crate::ports::storage::Storage;
use crate::usecases::balance_service::BalanceService;
use crate::usecases::market_dispatcher::MarketDispatcher;
use crate::usecases::market_store::MarketStore;
use crate::usecases::order_executor::OrderExecutor;
use crate::usecases::rate_limiter::TokenBucketRateLimiter;

/// Shared handler state.
pub struct AppState<S: Storage> {
    pub dispatcher: Arc<MarketDispatcher<S>>,
    pub executor: Arc<OrderExecutor<S>>,
    pub balance_service: Arc<BalanceService<S>>,
    pub market_store: Arc<MarketStore<S>>,
    pub rate_limiter: Arc<TokenBucketRateLimiter>,
    pub metrics: Arc<EngineMetrics>,
    /// Path prefixes that bypass rate limiting.
    pub exempt_paths: Vec<String>,
    pub ready: watch::Receiver<bool>,
}

/// Build the full API router. Probe and metrics routes sit outside the
/// rate-limit layer; the configured exempt prefixes cover anything else.
pub fn router<S: Storage>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/orders", post(handlers::submit_order::<S>))
        .route("/orders/:order_id/cancel", post(handlers::cancel_order::<S>))
        .route("/balances/:user_id", get(handlers::get_balance::<S>))
        .route("/markets/:market_id", get(handlers::get_market::<S>))
        .route("/deposits", post(handlers::submit_deposit::<S>))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::rate_limit::<S>,
        ))
        .route("/live", get(|| async { StatusCode::OK }))
        .route("/ready", get(handlers::ready::<S>))
        .route("/metrics", get(handlers::render_metrics::<S>))
        .with_state(state)
}
