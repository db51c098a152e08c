use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub deribit: DeribitConfig,
    pub ingestion: IngestionConfig,
    pub oi: OiConfig,
    pub greeks: GreeksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/oflow".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeribitConfig {
    pub api_url: String,
    pub ws_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Underlyings whose option chains are tracked.
    pub currencies: Vec<String>,
    /// Minimum spacing between WS requests, enforced process-wide.
    pub request_interval_ms: u64,
    /// Cooldown before retrying after an `over_limit` response.
    pub overload_cooldown_ms: u64,
    /// Deribit caps channels per subscribe call; stay under 500.
    pub sub_chunk_size: usize,
    /// REST request budget per second (governor quota).
    pub rest_requests_per_second: u32,
    pub http_timeout_secs: u64,
    pub instrument_cache_ttl_secs: u64,
    pub index_cache_ttl_secs: u64,
}

impl Default for DeribitConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.deribit.com/api/v2".to_string(),
            ws_url: "wss://www.deribit.com/ws/api/v2".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            currencies: vec!["BTC".to_string(), "ETH".to_string()],
            request_interval_ms: 150,
            overload_cooldown_ms: 500,
            sub_chunk_size: 400,
            rest_requests_per_second: 10,
            http_timeout_secs: 5,
            instrument_cache_ttl_secs: 300,
            index_cache_ttl_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Delay before re-opening the live connection after any failure.
    pub reconnect_backoff_secs: u64,
    /// Historical floor for backfill when the store is empty: midnight UTC
    /// this many days back.
    pub from_days_ago: i64,
    pub page_size: u32,
    pub max_pages_per_instrument: u32,
    /// Consecutive empty pages treated as end-of-history.
    pub empty_page_limit: u32,
    pub page_pause_min_ms: u64,
    pub page_pause_max_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_secs: 3,
            from_days_ago: 2,
            page_size: 1000,
            max_pages_per_instrument: 5000,
            empty_page_limit: 3,
            page_pause_min_ms: 50,
            page_pause_max_ms: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OiConfig {
    /// Only instruments expiring within this window get snapshots; short-dated
    /// contracts dominate OI turnover.
    pub snapshot_horizon_hours: i64,
    /// Skip an instrument when its newest snapshot is younger than this; also
    /// the re-entrancy guard against overlapping capture runs.
    pub min_snapshot_age_secs: i64,
    /// Snapshots older than this are ignored by reconciliation.
    pub reconcile_window_hours: i64,
}

impl Default for OiConfig {
    fn default() -> Self {
        Self {
            snapshot_horizon_hours: 32,
            min_snapshot_age_secs: 60,
            reconcile_window_hours: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeksConfig {
    pub risk_free_rate: f64,
    /// Time-to-expiry floor in hours; avoids the d1 singularity at expiry.
    pub min_time_hours: f64,
    pub delta_tau_seconds: f64,
    pub gamma_tau_seconds: f64,
    /// Price-grid half-width around the index price.
    pub grid_span: f64,
    pub grid_step: f64,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            min_time_hours: 1.0,
            delta_tau_seconds: 14_400.0,
            gamma_tau_seconds: 21_600.0,
            grid_span: 10_000.0,
            grid_step: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_exchange_limits() {
        let cfg = DeribitConfig::default();
        assert_eq!(cfg.request_interval_ms, 150);
        assert!(cfg.sub_chunk_size < 500);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = figment::Figment::new()
            .merge(figment::providers::Serialized::defaults(
                AppConfig::default(),
            ))
            .extract()
            .unwrap();
        assert_eq!(cfg.ingestion.empty_page_limit, 3);
        assert_eq!(cfg.oi.snapshot_horizon_hours, 32);
        assert_eq!(cfg.greeks.min_time_hours, 1.0);
    }
}
