//! Rate-limit middleware for the HTTP boundary.
//!
//! Strategy:
//! 1. Authenticated callers are keyed `user:<id>` from the `X-User-Id`
//!    header the auth layer sets; everyone else is keyed `ip:<addr>`,
//!    honoring the first `X-Forwarded-For` element when present.
//! 2. Exempted path prefixes bypass acquisition entirely.
//! 3. Refusals return 429 with `Retry-After` and `X-RateLimit-Identifier`
//!    headers and a machine-readable JSON body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::domain::error::EngineError;
use crate::ports::storage::Storage;

use super::AppState;

pub async fn rate_limit<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .exempt_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return next.run(request).await;
    }

    let identifier = identify(&request, connect_info);

    if !state.rate_limiter.try_acquire(&identifier) {
        let retry_after = state.rate_limiter.retry_after_seconds(&identifier);
        state.metrics.rate_limited.inc();
        warn!(
            identifier = %identifier,
            error = %EngineError::RateLimited { retry_after },
            "Request refused"
        );

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded",
                "identifier": identifier,
                "retryAfter": retry_after,
            })),
        )
            .into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            headers.insert("Retry-After", value);
        }
        if let Ok(value) = HeaderValue::from_str(&identifier) {
            headers.insert("X-RateLimit-Identifier", value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&identifier) {
        response
            .headers_mut()
            .insert("X-RateLimit-Identifier", value);
    }
    response
}

/// Principal identifier: authenticated user when available, client IP
/// otherwise.
fn identify(request: &Request, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    if let Some(user_id) = request
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("user:{user_id}");
    }

    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        // First element of the chain is the original client.
        if let Some(client) = forwarded.split(',').next() {
            let client = client.trim();
            if !client.is_empty() {
                return format!("ip:{client}");
            }
        }
    }

    match connect_info {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}
