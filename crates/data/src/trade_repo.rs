//! Trade repository.
//!
//! The upsert key is `exchange_trade_id`; the live consumer and the backfill
//! synchronizer race on it by design, so duplicate-key conflicts are
//! swallowed with ON CONFLICT DO NOTHING.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::warn;

use oflow_core::traits::TradeStore;
use oflow_core::types::{Trade, TradeFilter};

use crate::models::TradeRow;

const TRADE_COLUMNS: &str = "instrument_name, exchange_trade_id, strike, option_type, direction, \
     amount, price, index_price, implied_vol, event_time, expiration, \
     is_block_trade, block_trade_id, oi_impact, oi_reconciled, active";

/// Repository for trade operations.
#[derive(Debug, Clone)]
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn insert_builder<'a>(trades: &'a [Trade]) -> QueryBuilder<'a, Postgres> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO trades ({TRADE_COLUMNS}) "));
        builder.push_values(trades.iter().map(TradeRow::from), |mut b, row| {
            b.push_bind(row.instrument_name)
                .push_bind(row.exchange_trade_id)
                .push_bind(row.strike)
                .push_bind(row.option_type)
                .push_bind(row.direction)
                .push_bind(row.amount)
                .push_bind(row.price)
                .push_bind(row.index_price)
                .push_bind(row.implied_vol)
                .push_bind(row.event_time)
                .push_bind(row.expiration)
                .push_bind(row.is_block_trade)
                .push_bind(row.block_trade_id)
                .push_bind(row.oi_impact)
                .push_bind(row.oi_reconciled)
                .push_bind(row.active);
        });
        builder.push(" ON CONFLICT (exchange_trade_id) DO NOTHING");
        builder
    }
}

#[async_trait]
impl TradeStore for TradeRepository {
    async fn upsert_ignore_duplicate(&self, trade: &Trade) -> Result<bool> {
        let trades = std::slice::from_ref(trade);
        let mut builder = Self::insert_builder(trades);
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_many(&self, trades: &[Trade]) -> Result<u64> {
        if trades.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0_u64;
        // bounded chunks keep the bind count under Postgres limits
        for chunk in trades.chunks(500) {
            let mut builder = Self::insert_builder(chunk);
            let result = builder.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        Ok(written)
    }

    async fn latest_event_time(&self, instrument: &str) -> Result<Option<DateTime<Utc>>> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX(event_time)
            FROM trades
            WHERE instrument_name = $1
            "#,
        )
        .bind(instrument)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn find(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TRADE_COLUMNS} FROM trades WHERE TRUE"));

        if let Some(instrument) = &filter.instrument {
            builder.push(" AND instrument_name = ").push_bind(instrument);
        }
        if let Some(prefix) = &filter.instrument_prefix {
            builder
                .push(" AND instrument_name LIKE ")
                .push_bind(format!("{prefix}%"));
        }
        if let Some(after) = filter.after {
            builder.push(" AND event_time > ").push_bind(after);
        }
        if let Some(until) = filter.until {
            builder.push(" AND event_time <= ").push_bind(until);
        }
        if filter.exclude_block_trades {
            builder.push(" AND NOT is_block_trade");
        }
        if filter.unreconciled_only {
            builder.push(" AND NOT oi_reconciled");
        }
        if filter.active_only {
            builder.push(" AND active");
        }
        builder.push(" ORDER BY event_time ASC");

        let rows: Vec<TradeRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.exchange_trade_id.clone();
            match row.into_trade() {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(trade_id = %id, error = %e, "Skipping unreadable trade row"),
            }
        }
        Ok(trades)
    }

    async fn apply_oi_impacts(&self, impacts: &[(String, f64)]) -> Result<()> {
        if impacts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (trade_id, impact) in impacts {
            sqlx::query(
                r#"
                UPDATE trades
                SET oi_impact = $2, oi_reconciled = TRUE
                WHERE exchange_trade_id = $1
                "#,
            )
            .bind(trade_id)
            .bind(impact)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET active = FALSE
            WHERE active AND expiration < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
