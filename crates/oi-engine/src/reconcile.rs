//! Open-interest reconciliation.
//!
//! For each instrument with two recent snapshots, the OI change between
//! them is distributed over the unreconciled non-block trades executed in
//! the window `(older, newer]`, proportionally to absolute trade size. The
//! allocation conserves the total: impacts always sum to the OI delta
//! (to zero when there was no volume).

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use oflow_core::config::OiConfig;
use oflow_core::traits::{SnapshotStore, TradeStore};
use oflow_core::types::TradeFilter;

#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub instruments_reconciled: usize,
    pub trades_updated: usize,
    pub failed_instruments: Vec<String>,
}

/// Distributes `delta_oi` over trades proportionally to `|amount|`.
/// With zero total volume every impact is zero.
#[must_use]
pub fn allocate_impacts(delta_oi: f64, amounts: &[f64]) -> Vec<f64> {
    let total: f64 = amounts.iter().map(|a| a.abs()).sum();
    if !(total > 0.0) || !total.is_finite() {
        return vec![0.0; amounts.len()];
    }
    amounts
        .iter()
        .map(|a| delta_oi * a.abs() / total)
        .collect()
}

/// Runs one reconciliation pass over every instrument with at least two
/// snapshots inside the window. Each instrument commits independently.
///
/// # Errors
/// Currently infallible at the run level; the `Result` covers future
/// run-scoped failures.
pub async fn run_reconcile(
    trades: &dyn TradeStore,
    snapshots: &dyn SnapshotStore,
    cfg: &OiConfig,
    now: DateTime<Utc>,
) -> Result<ReconcileStats> {
    let since = now - Duration::hours(cfg.reconcile_window_hours);
    let candidates = snapshots.instruments_with_snapshots(since).await?;
    let mut stats = ReconcileStats::default();

    for instrument in candidates {
        match reconcile_instrument(trades, snapshots, &instrument, since).await {
            Ok(Some(updated)) => {
                stats.instruments_reconciled += 1;
                stats.trades_updated += updated;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Reconciliation failed for instrument");
                stats.failed_instruments.push(instrument);
            }
        }
    }

    info!(
        instruments = stats.instruments_reconciled,
        trades = stats.trades_updated,
        failed = stats.failed_instruments.len(),
        "Reconciliation pass complete"
    );
    Ok(stats)
}

async fn reconcile_instrument(
    trades: &dyn TradeStore,
    snapshots: &dyn SnapshotStore,
    instrument: &str,
    since: DateTime<Utc>,
) -> Result<Option<usize>> {
    let pair = snapshots.latest_two(instrument, since).await?;
    if pair.len() < 2 {
        return Ok(None);
    }
    let (newer, older) = (&pair[0], &pair[1]);
    let delta_oi = newer.open_interest - older.open_interest;

    let filter = TradeFilter {
        instrument: Some(instrument.to_string()),
        after: Some(older.timestamp),
        until: Some(newer.timestamp),
        exclude_block_trades: true,
        unreconciled_only: true,
        ..TradeFilter::default()
    };
    let window_trades = trades.find(&filter).await?;
    if window_trades.is_empty() {
        debug!(instrument, delta_oi, "No trades in snapshot window");
        return Ok(None);
    }

    let amounts: Vec<f64> = window_trades.iter().map(|t| t.amount).collect();
    let impacts = allocate_impacts(delta_oi, &amounts);
    let updates: Vec<(String, f64)> = window_trades
        .iter()
        .zip(&impacts)
        .map(|(t, &impact)| (t.exchange_trade_id.clone(), impact))
        .collect();

    trades.apply_oi_impacts(&updates).await?;
    debug!(
        instrument,
        delta_oi,
        trades = updates.len(),
        "Reconciled snapshot window"
    );
    Ok(Some(updates.len()))
}
