//! Domain types shared across the ingestion, reconciliation, and Greeks crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call or put, derived from the trailing letter of the instrument name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }

    #[must_use]
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "call" => Some(OptionType::Call),
            "put" => Some(OptionType::Put),
            _ => None,
        }
    }
}

/// Taker side of a trade as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }

    /// Parses the exchange's direction string; anything unrecognized maps to `None`
    /// so sign inference can fall back to the amount.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradeDirection::Buy),
            "sell" => Some(TradeDirection::Sell),
            _ => None,
        }
    }
}

/// An immutable exchange trade event.
///
/// Created once by ingestion and never rewritten afterwards except for
/// `oi_impact`/`oi_reconciled` (owned by the reconciliation engine) and
/// `active` (flipped off once expiration passes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange-native name, e.g. `BTC-27FEB26-50000-C`.
    pub instrument_name: String,
    /// Unique exchange identifier; the upsert key.
    pub exchange_trade_id: String,
    /// Strike price parsed out of the instrument name.
    pub strike: f64,
    pub option_type: OptionType,
    /// Missing or unrecognized directions stay `None`; sign inference then
    /// falls back to the sign of `amount`.
    pub direction: Option<TradeDirection>,
    pub amount: f64,
    pub price: f64,
    pub index_price: f64,
    /// Implied volatility in percent units as reported by the exchange.
    pub implied_vol: f64,
    /// Execution time (UTC).
    pub event_time: DateTime<Utc>,
    /// Contract expiry, 08:00 UTC on expiry day.
    pub expiration: DateTime<Utc>,
    pub is_block_trade: bool,
    pub block_trade_id: Option<String>,
    /// Open-interest change attributed to this trade; `None` until reconciled.
    pub oi_impact: Option<f64>,
    pub oi_reconciled: bool,
    pub active: bool,
}

impl Trade {
    /// Trade sign: direction wins; with no usable direction the sign of
    /// `amount` decides. Zero only when `amount` is exactly zero.
    #[must_use]
    pub fn signed_direction(&self) -> f64 {
        match self.direction {
            Some(TradeDirection::Buy) => 1.0,
            Some(TradeDirection::Sell) => -1.0,
            None => {
                if self.amount > 0.0 {
                    1.0
                } else if self.amount < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Implied volatility as a fraction (exchange reports percent).
    #[must_use]
    pub fn iv_fraction(&self) -> f64 {
        self.implied_vol / 100.0
    }

    /// Time to expiry in years; negative once expired.
    #[must_use]
    pub fn years_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (self.expiration - now).num_milliseconds() as f64 / 1000.0;
        seconds / (365.0 * 24.0 * 3600.0)
    }

    /// Age of the trade in seconds at `now`; negative for future timestamps.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.event_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Point-in-time open interest for one instrument. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OiSnapshot {
    pub instrument_name: String,
    pub open_interest: f64,
    pub timestamp: DateTime<Utc>,
}

/// Query filter for the trade repository.
///
/// `after` is exclusive, `until` inclusive, matching the reconciliation
/// window convention `(older.timestamp, newer.timestamp]`.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    /// Exact instrument match.
    pub instrument: Option<String>,
    /// Prefix match on the instrument name (e.g. `BTC-27FEB26`).
    pub instrument_prefix: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub exclude_block_trades: bool,
    pub unreconciled_only: bool,
    pub active_only: bool,
}
