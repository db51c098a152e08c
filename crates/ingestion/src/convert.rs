//! Conversion from exchange wire trades to the domain type.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use oflow_core::instrument::parse_instrument;
use oflow_core::types::{Trade, TradeDirection};
use oflow_deribit::types::RawTrade;

/// Builds a domain trade from a raw exchange event.
///
/// Strike, expiry, and option type come from the instrument name, not from
/// separate payload fields. Missing index price or IV default to zero; the
/// Greeks engine floors and skips degenerate inputs downstream.
///
/// # Errors
/// Returns an error for an unparsable instrument name, a missing trade id,
/// or an out-of-range timestamp. Callers log and skip the event.
pub fn raw_to_trade(raw: &RawTrade) -> Result<Trade> {
    let spec = parse_instrument(&raw.instrument_name)
        .with_context(|| format!("unsupported instrument `{}`", raw.instrument_name))?;

    let exchange_trade_id = raw
        .trade_id_string()
        .with_context(|| format!("trade on {} has no usable id", raw.instrument_name))?;

    let event_time = DateTime::<Utc>::from_timestamp_millis(raw.timestamp)
        .with_context(|| format!("trade {exchange_trade_id} has timestamp {}", raw.timestamp))?;

    Ok(Trade {
        instrument_name: raw.instrument_name.clone(),
        exchange_trade_id,
        strike: spec.strike,
        option_type: spec.option_type,
        direction: raw.direction.as_deref().and_then(TradeDirection::parse),
        amount: raw.amount,
        price: raw.price,
        index_price: raw.index_price.unwrap_or_default(),
        implied_vol: raw.iv.unwrap_or_default(),
        event_time,
        expiration: spec.expiry,
        is_block_trade: raw.block_trade_id.is_some(),
        block_trade_id: raw.block_trade_id.clone(),
        oi_impact: None,
        oi_reconciled: false,
        active: true,
    })
}
