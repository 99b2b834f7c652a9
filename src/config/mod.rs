//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. Every section has
//! serde defaults, so a missing file or a partial one still yields a
//! runnable configuration. Markets are seeded from config at startup —
//! trading never auto-creates them.

pub mod loader;

use serde::Deserialize;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Markets to seed into storage at startup.
    #[serde(default)]
    pub markets: Vec<MarketSeedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Token-bucket rate limiting.
///
/// Defaults allow a burst of 100 requests, then 10/s sustained.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Tokens added per second.
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
    /// Path prefixes exempt from rate limiting. Empty by default: the
    /// probe and metrics routes already sit outside the rate-limit layer,
    /// and this engine hosts no auth endpoints to exempt.
    #[serde(default)]
    pub exempt_paths: Vec<String>,
    /// Stale-bucket cleanup cadence (seconds).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            exempt_paths: Vec::new(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for the ledger log and collection snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Idle-flush ticker cadence (milliseconds).
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
    /// How long an entry must be quiet before it is written back.
    #[serde(default = "default_idle_threshold")]
    pub idle_flush_threshold_ms: i64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flush_interval_ms: default_flush_interval(),
            idle_flush_threshold_ms: default_idle_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Ledger-vs-cache sweep cadence (seconds).
    #[serde(default = "default_reconcile_interval")]
    pub interval_seconds: u64,
    /// Cached balances within this distance of the ledger are left alone.
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: String,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconcile_interval(),
            drift_tolerance: default_drift_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Bounded depth of each per-market lane.
    #[serde(default = "default_lane_depth")]
    pub lane_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lane_depth: default_lane_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// A market to seed at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSeedConfig {
    pub market_id: String,
    /// LMSR liquidity parameter.
    #[serde(default = "default_liquidity")]
    pub liquidity_b: f64,
}

// Default value functions for serde

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_capacity() -> u32 {
    100
}

fn default_refill_rate() -> f64 {
    10.0
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_flush_interval() -> u64 {
    1_000
}

fn default_idle_threshold() -> i64 {
    1_000
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_drift_tolerance() -> String {
    "0.0001".to_string()
}

fn default_lane_depth() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_liquidity() -> f64 {
    100.0
}
