//! REST client for backfill and snapshot capture.
//!
//! Rate limited with a direct governor limiter; instrument lists and index
//! prices go through a TTL cache with stale-value fallback, since both move
//! slowly and the scheduled jobs re-request them aggressively.

use anyhow::{Context, Result};
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use oflow_core::config::DeribitConfig;

use crate::cache::TtlCache;
use crate::types::{BookSummary, IndexPriceResult, Instrument, RpcEnvelope, TradesPage};

type DirectLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

pub struct DeribitRest {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<DirectLimiter>,
    instrument_cache: TtlCache<String, Vec<Instrument>>,
    index_cache: TtlCache<String, f64>,
}

impl DeribitRest {
    /// Builds the REST client from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(cfg: &DeribitConfig) -> Result<Self> {
        let per_second =
            NonZeroU32::new(cfg.rest_requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.api_url.clone(),
            limiter,
            instrument_cache: TtlCache::new(Duration::from_secs(cfg.instrument_cache_ttl_secs)),
            index_cache: TtlCache::new(Duration::from_secs(cfg.index_cache_ttl_secs)),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        let envelope: RpcEnvelope<T> = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = envelope.error {
            anyhow::bail!(
                "exchange error for {path}: code {}, {}",
                error.code,
                error.message
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("missing result for {path}"))
    }

    /// Non-expired option instruments for one underlying, TTL-cached.
    /// Falls back to the last cached value if the refresh fails.
    ///
    /// # Errors
    /// Returns error only when the fetch fails and no cached value exists.
    pub async fn option_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        let key = currency.to_string();
        if let Some(cached) = self.instrument_cache.get(&key) {
            return Ok(cached);
        }

        let fetched: Result<Vec<Instrument>> = self
            .get(
                "/public/get_instruments",
                &[
                    ("currency", currency.to_string()),
                    ("kind", "option".to_string()),
                    ("expired", "false".to_string()),
                ],
            )
            .await;

        match fetched {
            Ok(instruments) => {
                self.instrument_cache.put(key, instruments.clone());
                Ok(instruments)
            }
            Err(e) => {
                if let Some(stale) = self.instrument_cache.get_stale(&key) {
                    warn!(currency, error = %e, "Instrument refresh failed; using stale cache");
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Current index price for e.g. `btc_usd`, TTL-cached with stale fallback.
    ///
    /// # Errors
    /// Returns error only when the fetch fails and no cached value exists.
    pub async fn index_price(&self, index_name: &str) -> Result<f64> {
        let key = index_name.to_string();
        if let Some(cached) = self.index_cache.get(&key) {
            return Ok(cached);
        }

        let fetched: Result<IndexPriceResult> = self
            .get(
                "/public/get_index_price",
                &[("index_name", index_name.to_string())],
            )
            .await;

        match fetched {
            Ok(result) => {
                self.index_cache.put(key, result.index_price);
                Ok(result.index_price)
            }
            Err(e) => {
                if let Some(stale) = self.index_cache.get_stale(&key) {
                    warn!(index_name, error = %e, "Index price refresh failed; using stale cache");
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// One book summary per option instrument for a currency; the single
    /// authoritative open-interest read per capture run.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn book_summaries(&self, currency: &str) -> Result<Vec<BookSummary>> {
        self.get(
            "/public/get_book_summary_by_currency",
            &[
                ("currency", currency.to_string()),
                ("kind", "option".to_string()),
            ],
        )
        .await
    }

    /// One ascending page of the time-windowed trade history.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn trades_page(
        &self,
        instrument: &str,
        start_ms: i64,
        end_ms: i64,
        count: u32,
    ) -> Result<TradesPage> {
        self.get(
            "/public/get_last_trades_by_instrument_and_time",
            &[
                ("instrument_name", instrument.to_string()),
                ("start_timestamp", start_ms.to_string()),
                ("end_timestamp", end_ms.to_string()),
                ("count", count.to_string()),
                ("sorting", "asc".to_string()),
            ],
        )
        .await
    }
}
