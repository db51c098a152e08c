//! `PostgreSQL` persistence for trades and open-interest snapshots.
//!
//! Implements the `oflow-core` repository traits. Schema management is
//! handled externally; this crate assumes the `trades` and `oi_snapshots`
//! tables exist.

pub mod models;
pub mod snapshot_repo;
pub mod trade_repo;

pub use models::{SnapshotRow, TradeRow};
pub use snapshot_repo::SnapshotRepository;
pub use trade_repo::TradeRepository;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connects a pool using the application's database configuration.
///
/// # Errors
/// Returns an error if the database connection cannot be established.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}
