//! HTTP request handlers.
//!
//! Thin translation between the wire and the use cases: trade submissions
//! go through the per-market dispatcher, everything else hits its service
//! directly. Engine errors map onto the status taxonomy: 4xx for caller
//! mistakes, 409 for races, 429 for rate limiting, 5xx only for unexpected
//! execution failure.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::domain::error::EngineError;
use crate::domain::money::Money;
use crate::domain::order::TradeRequest;
use crate::ports::storage::Storage;

use super::AppState;

pub async fn submit_order<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<TradeRequest>,
) -> Response {
    match state.dispatcher.submit(request).await {
        Ok(order) => {
            state.metrics.orders_executed.inc();
            (StatusCode::CREATED, Json(order)).into_response()
        }
        Err(err) => {
            state
                .metrics
                .orders_rejected
                .with_label_values(&[rejection_label(&err)])
                .inc();
            error_response(&err)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: String,
}

pub async fn cancel_order<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Response {
    match state.executor.cancel(&order_id, &request.user_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "order_id": order_id, "status": "CANCELLED" })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn get_balance<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Response {
    match state.balance_service.balance(&user_id).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(json!({ "user_id": user_id, "balance": balance })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn get_market<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(market_id): Path<String>,
) -> Response {
    match state.market_store.get_or_load(&market_id).await {
        Ok(Some(market)) => (StatusCode::OK, Json(market)).into_response(),
        Ok(None) => error_response(&EngineError::MarketNotFound(market_id)),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: String,
    pub amount: Money,
}

pub async fn submit_deposit<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<DepositRequest>,
) -> Response {
    match state
        .balance_service
        .deposit(&request.user_id, request.amount)
        .await
    {
        Ok(tx) => (StatusCode::CREATED, Json(tx)).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn ready<S: Storage>(State(state): State<Arc<AppState<S>>>) -> StatusCode {
    if *state.ready.borrow() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn render_metrics<S: Storage>(State(state): State<Arc<AppState<S>>>) -> String {
    state.metrics.render()
}

/// Map an engine error onto the HTTP status taxonomy.
fn error_response(err: &EngineError) -> Response {
    let status = match err {
        EngineError::Validation(_)
        | EngineError::MarketNotFound(_)
        | EngineError::InsufficientBalance { .. }
        | EngineError::InvalidAmount(_)
        | EngineError::Arithmetic(_) => StatusCode::BAD_REQUEST,
        EngineError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        EngineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::NotActive(_)
        | EngineError::RaceLost(_)
        | EngineError::DuplicateNonce(_)
        | EngineError::IllegalTransition { .. } => StatusCode::CONFLICT,
        EngineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        EngineError::Execution(_) | EngineError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn rejection_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::Validation(_) => "validation",
        EngineError::MarketNotFound(_) => "market_not_found",
        EngineError::InsufficientBalance { .. } => "insufficient_balance",
        EngineError::RateLimited { .. } => "rate_limited",
        _ => "execution",
    }
}
