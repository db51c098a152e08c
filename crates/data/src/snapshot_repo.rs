//! Open-interest snapshot repository.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use oflow_core::traits::SnapshotStore;
use oflow_core::types::OiSnapshot;

use crate::models::SnapshotRow;

/// Repository for open-interest snapshot operations.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: PgPool,
}

impl SnapshotRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SnapshotRepository {
    async fn append(&self, snapshot: &OiSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oi_snapshots (instrument_name, open_interest, timestamp)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&snapshot.instrument_name)
        .bind(snapshot.open_interest)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_two(
        &self,
        instrument: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<OiSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT instrument_name, open_interest, timestamp
            FROM oi_snapshots
            WHERE instrument_name = $1 AND timestamp >= $2
            ORDER BY timestamp DESC
            LIMIT 2
            "#,
        )
        .bind(instrument)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OiSnapshot::from).collect())
    }

    async fn latest_timestamp(&self, instrument: &str) -> Result<Option<DateTime<Utc>>> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX(timestamp)
            FROM oi_snapshots
            WHERE instrument_name = $1
            "#,
        )
        .bind(instrument)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn instruments_with_snapshots(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT instrument_name
            FROM oi_snapshots
            WHERE timestamp >= $1
            GROUP BY instrument_name
            HAVING COUNT(*) >= 2
            ORDER BY instrument_name
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
