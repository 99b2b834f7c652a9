//! LMSR Market Engine — Entry Point
//!
//! Loads configuration, wires the execution pipeline onto file-backed
//! storage, starts the flush/reconciliation/cleanup tickers and the HTTP
//! boundary, then runs until SIGINT.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use lmsr_market_engine::adapters::http::{self, AppState};
use lmsr_market_engine::adapters::metrics::EngineMetrics;
use lmsr_market_engine::adapters::persistence::FileStorage;
use lmsr_market_engine::config::{self, AppConfig};
use lmsr_market_engine::domain::market::MarketState;
use lmsr_market_engine::domain::money::Money;
use lmsr_market_engine::usecases::{
    BalanceService, Ledger, MarketDispatcher, MarketStore, OrderExecutor, OrderValidator,
    PositionStore, TokenBucketRateLimiter,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.engine.log_level)
            }),
        )
        .json()
        .init();

    info!(
        bind = %config.server.bind_address,
        markets = config.markets.len(),
        data_dir = %config.persistence.data_dir,
        "Starting LMSR market engine"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = watch::channel(true);

    // ── wiring ──────────────────────────────────────────────
    let storage = Arc::new(
        FileStorage::open(&config.persistence.data_dir)
            .await
            .context("Failed to open storage")?,
    );
    let ledger = Arc::new(Ledger::new(Arc::clone(&storage)));
    let drift_tolerance = Money::of(&config.reconciliation.drift_tolerance)
        .context("Invalid drift tolerance")?;
    let balance_service = Arc::new(BalanceService::new(
        Arc::clone(&storage),
        Arc::clone(&ledger),
        drift_tolerance,
    ));
    let market_store = Arc::new(MarketStore::new(
        Arc::clone(&storage),
        config.persistence.idle_flush_threshold_ms,
    ));
    let position_store = Arc::new(PositionStore::new(
        Arc::clone(&storage),
        config.persistence.idle_flush_threshold_ms,
    ));
    let validator = Arc::new(OrderValidator::new(Arc::clone(&balance_service)));
    let executor = Arc::new(OrderExecutor::new(
        Arc::clone(&storage),
        Arc::clone(&ledger),
        Arc::clone(&balance_service),
        validator,
        Arc::clone(&market_store),
        Arc::clone(&position_store),
    ));
    let dispatcher = Arc::new(MarketDispatcher::new(
        Arc::clone(&executor),
        config.dispatch.lane_depth,
    ));
    let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
        config.rate_limit.capacity,
        config.rate_limit.refill_rate,
    ));
    let metrics = Arc::new(EngineMetrics::new().context("Failed to build metrics")?);

    seed_markets(&config, &market_store).await?;

    // ── schedulers ──────────────────────────────────────────
    spawn_flush_ticker(
        Arc::clone(&market_store),
        Arc::clone(&position_store),
        config.persistence.flush_interval_ms,
        shutdown_tx.subscribe(),
    );
    spawn_reconciliation_ticker(
        Arc::clone(&balance_service),
        Arc::clone(&metrics),
        config.reconciliation.interval_seconds,
        shutdown_tx.subscribe(),
    );
    spawn_limiter_cleanup_ticker(
        Arc::clone(&rate_limiter),
        config.rate_limit.cleanup_interval_seconds,
        shutdown_tx.subscribe(),
    );

    // ── HTTP boundary ───────────────────────────────────────
    let state = Arc::new(AppState {
        dispatcher,
        executor,
        balance_service,
        market_store,
        rate_limiter,
        metrics,
        exempt_paths: config.rate_limit.exempt_paths.clone(),
        ready: ready_rx,
    });
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .context("Failed to bind server address")?;
    info!(address = %config.server.bind_address, "HTTP server listening");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        })
        .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server failed");
        }
    });

    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    let _ = ready_tx.send(false);
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(10), server).await;

    info!("Shutdown complete");
    Ok(())
}

/// Register configured markets that are not already in storage.
async fn seed_markets(
    config: &AppConfig,
    market_store: &Arc<MarketStore<FileStorage>>,
) -> Result<()> {
    for seed in &config.markets {
        if market_store.get_or_load(&seed.market_id).await?.is_none() {
            market_store
                .create(MarketState::new(&seed.market_id, seed.liquidity_b))
                .await?;
            info!(
                market_id = %seed.market_id,
                liquidity_b = seed.liquidity_b,
                "Seeded market"
            );
        }
    }
    Ok(())
}

/// Idle-flush ticker: write back quiet markets and positions.
fn spawn_flush_ticker(
    market_store: Arc<MarketStore<FileStorage>>,
    position_store: Arc<PositionStore<FileStorage>>,
    interval_ms: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now().timestamp_millis();
                    market_store.flush_idle(now).await;
                    position_store.flush_idle(now).await;
                }
                _ = shutdown.recv() => break,
            }
        }
        // Final best-effort flush so a clean shutdown loses nothing; the
        // far-future timestamp makes every dirty entry count as idle.
        let flush_all = i64::MAX / 2;
        market_store.flush_idle(flush_all).await;
        position_store.flush_idle(flush_all).await;
        info!("Flush ticker stopped");
    });
}

/// Ledger-vs-cache reconciliation ticker.
fn spawn_reconciliation_ticker(
    balance_service: Arc<BalanceService<FileStorage>>,
    metrics: Arc<EngineMetrics>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match balance_service.reconcile_all().await {
                        Ok(report) => {
                            metrics
                                .balance_drift_corrections
                                .inc_by(report.corrected as u64);
                        }
                        Err(e) => error!(error = %e, "Balance reconciliation failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("Reconciliation ticker stopped");
    });
}

/// Stale rate-limit bucket eviction ticker.
fn spawn_limiter_cleanup_ticker(
    rate_limiter: Arc<TokenBucketRateLimiter>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => rate_limiter.cleanup(),
                _ = shutdown.recv() => break,
            }
        }
        info!("Rate-limiter cleanup ticker stopped");
    });
}
