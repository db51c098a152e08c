//! Open-interest snapshot capture.
//!
//! One book-summary read per currency per run supplies the open interest
//! for every instrument; only contracts expiring inside the horizon are
//! recorded, and a minimum-age guard keeps overlapping runs from writing
//! near-duplicate rows.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use oflow_core::config::OiConfig;
use oflow_core::traits::SnapshotStore;
use oflow_core::types::OiSnapshot;
use oflow_deribit::rest::DeribitRest;
use oflow_deribit::types::Instrument;

/// Exchange data needed by a capture run, extracted for testability.
#[async_trait]
pub trait OiSource: Send + Sync {
    async fn option_instruments(&self, currency: &str) -> Result<Vec<Instrument>>;

    /// Open interest per instrument name, from one bulk read.
    async fn open_interest(&self, currency: &str) -> Result<HashMap<String, f64>>;
}

#[async_trait]
impl OiSource for DeribitRest {
    async fn option_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        DeribitRest::option_instruments(self, currency).await
    }

    async fn open_interest(&self, currency: &str) -> Result<HashMap<String, f64>> {
        let summaries = self.book_summaries(currency).await?;
        Ok(summaries
            .into_iter()
            .map(|s| (s.instrument_name, s.open_interest))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub instruments_considered: usize,
    pub snapshots_written: usize,
    pub skipped_recent: usize,
    pub failed_currencies: Vec<String>,
}

/// Captures one snapshot per eligible instrument across all currencies.
///
/// A failing currency is recorded and the rest proceed. Within a currency,
/// a failing append is logged and the remaining instruments proceed.
///
/// # Errors
/// Currently infallible at the run level; the `Result` covers future
/// run-scoped failures.
pub async fn capture_snapshots(
    source: &dyn OiSource,
    store: &dyn SnapshotStore,
    cfg: &OiConfig,
    currencies: &[String],
    now: DateTime<Utc>,
) -> Result<CaptureStats> {
    let mut stats = CaptureStats::default();
    let horizon = now + Duration::hours(cfg.snapshot_horizon_hours);

    for currency in currencies {
        match capture_currency(source, store, cfg, currency, now, horizon, &mut stats).await {
            Ok(()) => {}
            Err(e) => {
                warn!(currency = %currency, error = %e, "Snapshot capture failed for currency");
                stats.failed_currencies.push(currency.clone());
            }
        }
    }

    info!(
        considered = stats.instruments_considered,
        written = stats.snapshots_written,
        skipped_recent = stats.skipped_recent,
        failed_currencies = stats.failed_currencies.len(),
        "Snapshot capture complete"
    );
    Ok(stats)
}

async fn capture_currency(
    source: &dyn OiSource,
    store: &dyn SnapshotStore,
    cfg: &OiConfig,
    currency: &str,
    now: DateTime<Utc>,
    horizon: DateTime<Utc>,
    stats: &mut CaptureStats,
) -> Result<()> {
    let instruments = source.option_instruments(currency).await?;
    let open_interest = source.open_interest(currency).await?;

    for instrument in instruments {
        if !within_horizon(&instrument, now, horizon) {
            continue;
        }
        stats.instruments_considered += 1;

        let name = &instrument.instrument_name;
        if let Some(latest) = store.latest_timestamp(name).await? {
            if (now - latest).num_seconds() < cfg.min_snapshot_age_secs {
                stats.skipped_recent += 1;
                continue;
            }
        }

        let Some(&oi) = open_interest.get(name) else {
            debug!(instrument = %name, "No book summary for instrument; skipping");
            continue;
        };

        let snapshot = OiSnapshot {
            instrument_name: name.clone(),
            open_interest: oi,
            timestamp: now,
        };
        match store.append(&snapshot).await {
            Ok(()) => stats.snapshots_written += 1,
            Err(e) => warn!(instrument = %name, error = %e, "Failed to append snapshot"),
        }
    }

    Ok(())
}

fn within_horizon(instrument: &Instrument, now: DateTime<Utc>, horizon: DateTime<Utc>) -> bool {
    let Some(expiry) = DateTime::<Utc>::from_timestamp_millis(instrument.expiration_timestamp)
    else {
        return false;
    };
    expiry > now && expiry <= horizon
}
