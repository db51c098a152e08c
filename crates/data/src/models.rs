//! Row models mapping the domain types onto the Postgres schema.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use oflow_core::types::{OiSnapshot, OptionType, Trade, TradeDirection};

/// One row of the `trades` table.
#[derive(Debug, Clone, FromRow)]
pub struct TradeRow {
    pub instrument_name: String,
    pub exchange_trade_id: String,
    pub strike: f64,
    pub option_type: String,
    pub direction: Option<String>,
    pub amount: f64,
    pub price: f64,
    pub index_price: f64,
    pub implied_vol: f64,
    pub event_time: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub is_block_trade: bool,
    pub block_trade_id: Option<String>,
    pub oi_impact: Option<f64>,
    pub oi_reconciled: bool,
    pub active: bool,
}

impl TradeRow {
    /// Converts a stored row back into the domain type.
    ///
    /// # Errors
    /// Returns an error if the stored option type is unrecognized; callers
    /// in batch loops log and skip the row.
    pub fn into_trade(self) -> Result<Trade> {
        let option_type = OptionType::from_db(&self.option_type).ok_or_else(|| {
            anyhow::anyhow!(
                "unrecognized option type `{}` for trade {}",
                self.option_type,
                self.exchange_trade_id
            )
        })?;
        let direction = self.direction.as_deref().and_then(TradeDirection::parse);

        Ok(Trade {
            instrument_name: self.instrument_name,
            exchange_trade_id: self.exchange_trade_id,
            strike: self.strike,
            option_type,
            direction,
            amount: self.amount,
            price: self.price,
            index_price: self.index_price,
            implied_vol: self.implied_vol,
            event_time: self.event_time,
            expiration: self.expiration,
            is_block_trade: self.is_block_trade,
            block_trade_id: self.block_trade_id,
            oi_impact: self.oi_impact,
            oi_reconciled: self.oi_reconciled,
            active: self.active,
        })
    }
}

impl From<&Trade> for TradeRow {
    fn from(trade: &Trade) -> Self {
        Self {
            instrument_name: trade.instrument_name.clone(),
            exchange_trade_id: trade.exchange_trade_id.clone(),
            strike: trade.strike,
            option_type: trade.option_type.as_str().to_string(),
            direction: trade.direction.map(|d| d.as_str().to_string()),
            amount: trade.amount,
            price: trade.price,
            index_price: trade.index_price,
            implied_vol: trade.implied_vol,
            event_time: trade.event_time,
            expiration: trade.expiration,
            is_block_trade: trade.is_block_trade,
            block_trade_id: trade.block_trade_id.clone(),
            oi_impact: trade.oi_impact,
            oi_reconciled: trade.oi_reconciled,
            active: trade.active,
        }
    }
}

/// One row of the `oi_snapshots` table.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub instrument_name: String,
    pub open_interest: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<SnapshotRow> for OiSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            instrument_name: row.instrument_name,
            open_interest: row.open_interest,
            timestamp: row.timestamp,
        }
    }
}
