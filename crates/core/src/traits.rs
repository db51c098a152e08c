use crate::types::{OiSnapshot, Trade, TradeFilter};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable, deduplicated trade record keyed by the exchange trade id.
///
/// The live consumer and the backfill synchronizer both write through this
/// contract concurrently; duplicate ids are expected and must be swallowed.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Inserts a trade, silently ignoring a duplicate `exchange_trade_id`.
    /// Returns `true` when a row was actually written.
    async fn upsert_ignore_duplicate(&self, trade: &Trade) -> Result<bool>;

    /// Inserts a batch in a single transaction, ignoring duplicates.
    /// Returns the number of rows actually written.
    async fn upsert_many(&self, trades: &[Trade]) -> Result<u64>;

    /// Most recent `event_time` stored for an instrument; backfill resume point.
    async fn latest_event_time(&self, instrument: &str) -> Result<Option<DateTime<Utc>>>;

    async fn find(&self, filter: &TradeFilter) -> Result<Vec<Trade>>;

    /// Applies reconciled OI impacts for one instrument in a single
    /// transaction, so a late failure rolls back only that instrument.
    async fn apply_oi_impacts(&self, impacts: &[(String, f64)]) -> Result<()>;

    /// Soft-deactivates trades whose expiration has passed. Returns the count.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Append-only open-interest snapshot log, ordered by timestamp per instrument.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn append(&self, snapshot: &OiSnapshot) -> Result<()>;

    /// The two most recent snapshots (newest first) taken after `since`.
    async fn latest_two(&self, instrument: &str, since: DateTime<Utc>) -> Result<Vec<OiSnapshot>>;

    async fn latest_timestamp(&self, instrument: &str) -> Result<Option<DateTime<Utc>>>;

    /// Instruments with at least two snapshots after `since`; the candidates
    /// for a reconciliation pass.
    async fn instruments_with_snapshots(&self, since: DateTime<Utc>) -> Result<Vec<String>>;
}
