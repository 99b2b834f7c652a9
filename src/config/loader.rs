//! Configuration loader — reads and validates `config.toml`.

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::money::Money;

use super::AppConfig;

/// Load and validate configuration from a TOML file. A missing file yields
/// the defaults.
pub fn load_config(path: &str) -> Result<AppConfig> {
    let config = if std::path::Path::new(path).exists() {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {path}"))?;
        toml::from_str(&content).context("Failed to parse config.toml")?
    } else {
        info!(path = path, "No config file found, using defaults");
        AppConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Validate critical configuration fields.
fn validate_config(config: &AppConfig) -> Result<()> {
    anyhow::ensure!(
        !config.server.bind_address.is_empty(),
        "server.bind_address must not be empty"
    );
    anyhow::ensure!(
        config.rate_limit.capacity > 0,
        "rate_limit.capacity must be positive"
    );
    anyhow::ensure!(
        config.rate_limit.refill_rate > 0.0,
        "rate_limit.refill_rate must be positive"
    );
    anyhow::ensure!(
        config.dispatch.lane_depth > 0,
        "dispatch.lane_depth must be positive"
    );
    anyhow::ensure!(
        config.persistence.idle_flush_threshold_ms > 0,
        "persistence.idle_flush_threshold_ms must be positive"
    );
    anyhow::ensure!(
        Money::of(&config.reconciliation.drift_tolerance).is_ok(),
        "reconciliation.drift_tolerance must be a valid decimal"
    );
    for market in &config.markets {
        anyhow::ensure!(
            !market.market_id.is_empty(),
            "markets entries need a market_id"
        );
        anyhow::ensure!(
            market.liquidity_b > 0.0,
            "markets.liquidity_b must be positive for {}",
            market.market_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            [server]
            bind_address = "127.0.0.1:9000"

            [rate_limit]
            capacity = 5
            refill_rate = 0.5
            exempt_paths = ["/internal/", "/status"]

            [reconciliation]
            drift_tolerance = "0.001"

            [[markets]]
            market_id = "btc-above-100k"
            liquidity_b = 250.0
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        validate_config(&config).unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.rate_limit.capacity, 5);
        assert_eq!(config.markets.len(), 1);
        assert_eq!(config.markets[0].liquidity_b, 250.0);
        // Untouched sections keep their defaults.
        assert_eq!(config.dispatch.lane_depth, 256);
    }

    #[test]
    fn rejects_zero_capacity() {
        let toml = "[rate_limit]\ncapacity = 0\n";
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_bad_drift_tolerance() {
        let toml = "[reconciliation]\ndrift_tolerance = \"lots\"\n";
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
