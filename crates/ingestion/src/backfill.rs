//! Historical trade backfill.
//!
//! Walks each instrument's trade history forward in ascending pages from its
//! resume point, buffers the pages, and commits per instrument so a failing
//! instrument never loses another's progress.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use oflow_core::config::IngestionConfig;
use oflow_core::traits::TradeStore;
use oflow_deribit::rest::DeribitRest;
use oflow_deribit::types::TradesPage;

use crate::convert::raw_to_trade;

/// Source of paged trade history, extracted so the pagination logic is
/// testable without a live exchange.
#[async_trait]
pub trait TradeHistory: Send + Sync {
    async fn trades_page(
        &self,
        instrument: &str,
        start_ms: i64,
        end_ms: i64,
        count: u32,
    ) -> Result<TradesPage>;
}

#[async_trait]
impl TradeHistory for DeribitRest {
    async fn trades_page(
        &self,
        instrument: &str,
        start_ms: i64,
        end_ms: i64,
        count: u32,
    ) -> Result<TradesPage> {
        DeribitRest::trades_page(self, instrument, start_ms, end_ms, count).await
    }
}

#[derive(Debug, Default)]
pub struct BackfillStats {
    pub instruments_processed: usize,
    pub pages_fetched: u64,
    pub trades_written: u64,
    pub failed_instruments: Vec<String>,
}

/// Backfills every listed instrument up to `now`.
///
/// A failing instrument is recorded in the stats and the run continues; the
/// next run resumes it from its stored high-water mark.
///
/// # Errors
/// Currently infallible at the run level; the `Result` covers future
/// run-scoped failures.
pub async fn run_backfill(
    history: &dyn TradeHistory,
    store: &dyn TradeStore,
    instruments: &[String],
    cfg: &IngestionConfig,
    now: DateTime<Utc>,
) -> Result<BackfillStats> {
    let mut stats = BackfillStats::default();

    for instrument in instruments {
        match backfill_instrument(history, store, instrument, cfg, now).await {
            Ok((pages, written)) => {
                stats.instruments_processed += 1;
                stats.pages_fetched += pages;
                stats.trades_written += written;
            }
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Backfill failed for instrument");
                stats.failed_instruments.push(instrument.clone());
            }
        }
    }

    info!(
        instruments = stats.instruments_processed,
        pages = stats.pages_fetched,
        written = stats.trades_written,
        failed = stats.failed_instruments.len(),
        "Backfill run complete"
    );
    Ok(stats)
}

async fn backfill_instrument(
    history: &dyn TradeHistory,
    store: &dyn TradeStore,
    instrument: &str,
    cfg: &IngestionConfig,
    now: DateTime<Utc>,
) -> Result<(u64, u64)> {
    let mut start_ms = resume_point(store, instrument, cfg, now).await?;
    let end_ms = now.timestamp_millis();
    if start_ms >= end_ms {
        debug!(instrument, "Already caught up");
        return Ok((0, 0));
    }

    let mut buffer = Vec::new();
    let mut pages = 0_u64;
    let mut empty_streak = 0_u32;

    while pages < u64::from(cfg.max_pages_per_instrument) {
        let page = history
            .trades_page(instrument, start_ms, end_ms, cfg.page_size)
            .await?;
        pages += 1;

        if page.trades.is_empty() {
            // has_more can stay true on empty windows; the streak decides
            empty_streak += 1;
            if empty_streak >= cfg.empty_page_limit {
                debug!(instrument, pages, "Empty-page streak; treating as end of history");
                break;
            }
        } else {
            empty_streak = 0;
            let last_ts = page.trades[page.trades.len() - 1].timestamp;
            for raw in &page.trades {
                match raw_to_trade(raw) {
                    Ok(trade) => buffer.push(trade),
                    Err(e) => {
                        warn!(instrument, error = %e, "Skipping unusable historical trade");
                    }
                }
            }
            start_ms = last_ts + 1;
            if !page.has_more {
                break;
            }
        }

        page_pause(cfg).await;
    }

    let written = store.upsert_many(&buffer).await?;
    debug!(instrument, pages, fetched = buffer.len(), written, "Instrument backfilled");
    Ok((pages, written))
}

/// Resume point in epoch milliseconds: one past the stored high-water mark,
/// or midnight UTC `from_days_ago` days back when the store is empty.
async fn resume_point(
    store: &dyn TradeStore,
    instrument: &str,
    cfg: &IngestionConfig,
    now: DateTime<Utc>,
) -> Result<i64> {
    if let Some(latest) = store.latest_event_time(instrument).await? {
        return Ok(latest.timestamp_millis() + 1);
    }
    let floor = (now - ChronoDuration::days(cfg.from_days_ago))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |t| t.and_utc());
    Ok(floor.timestamp_millis())
}

async fn page_pause(cfg: &IngestionConfig) {
    let pause_ms = if cfg.page_pause_max_ms > cfg.page_pause_min_ms {
        rand::thread_rng().gen_range(cfg.page_pause_min_ms..=cfg.page_pause_max_ms)
    } else {
        cfg.page_pause_min_ms
    };
    if pause_ms > 0 {
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
    }
}
