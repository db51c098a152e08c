//! Live trade consumer.
//!
//! Connects the WS client, subscribes to the raw trade channel of every
//! non-expired option instrument, and writes each event through the
//! deduplicating store. Any failure tears the session down; the outer loop
//! waits the configured backoff and rebuilds everything from scratch,
//! forever.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use oflow_core::config::{DeribitConfig, IngestionConfig};
use oflow_core::traits::TradeStore;
use oflow_deribit::client::DeribitClient;
use oflow_deribit::pacer::RequestPacer;
use oflow_deribit::types::RawTrade;

use crate::convert::raw_to_trade;

/// Lifecycle of one live session, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumerState {
    Connecting,
    Authenticating,
    Subscribing,
    Streaming,
}

impl ConsumerState {
    fn as_str(self) -> &'static str {
        match self {
            ConsumerState::Connecting => "connecting",
            ConsumerState::Authenticating => "authenticating",
            ConsumerState::Subscribing => "subscribing",
            ConsumerState::Streaming => "streaming",
        }
    }
}

fn enter(state: ConsumerState) {
    info!(state = state.as_str(), "Live consumer state change");
}

/// Runs the live consumer until the task is cancelled. Never returns Ok on
/// its own; every session end or failure leads to a reconnect.
pub async fn run_live(
    store: Arc<dyn TradeStore>,
    deribit: DeribitConfig,
    ingestion: IngestionConfig,
) -> Result<()> {
    let pacer = Arc::new(RequestPacer::new(Duration::from_millis(
        deribit.request_interval_ms,
    )));
    let backoff = Duration::from_secs(ingestion.reconnect_backoff_secs);

    loop {
        match run_session(store.as_ref(), &deribit, &pacer).await {
            Ok(()) => warn!("Live session ended; reconnecting"),
            Err(e) => error!(error = %e, "Live session failed; reconnecting"),
        }
        tokio::time::sleep(backoff).await;
    }
}

async fn run_session(
    store: &dyn TradeStore,
    deribit: &DeribitConfig,
    pacer: &Arc<RequestPacer>,
) -> Result<()> {
    enter(ConsumerState::Connecting);
    let mut client = DeribitClient::connect(
        deribit.ws_url.clone(),
        Arc::clone(pacer),
        Duration::from_millis(deribit.overload_cooldown_ms),
    )
    .await?;

    if !deribit.client_id.is_empty() {
        enter(ConsumerState::Authenticating);
        client
            .authenticate(&deribit.client_id, &deribit.client_secret)
            .await?;
    }

    enter(ConsumerState::Subscribing);
    let mut channels = Vec::new();
    for currency in &deribit.currencies {
        let instruments = client.fetch_option_instruments(currency).await?;
        channels.extend(
            instruments
                .iter()
                .map(|i| format!("trades.{}.raw", i.instrument_name)),
        );
    }

    let report = client
        .subscribe_in_chunks(&channels, deribit.sub_chunk_size)
        .await?;
    if report.is_complete() {
        info!(channels = report.subscribed_channels, "Subscribed to all trade channels");
    } else {
        warn!(
            requested = report.requested_channels,
            subscribed = report.subscribed_channels,
            failed_chunks = report.failed_chunks.len(),
            "Partial subscription; continuing with what succeeded"
        );
    }

    enter(ConsumerState::Streaming);
    while let Some(msg) = client.next_event().await? {
        let Some(raws) = notification_trades(&msg) else {
            debug!("Ignoring non-trade message");
            continue;
        };
        for raw in raws {
            store_trade(store, &raw).await;
        }
    }

    Ok(())
}

async fn store_trade(store: &dyn TradeStore, raw: &RawTrade) {
    let trade = match raw_to_trade(raw) {
        Ok(trade) => trade,
        Err(e) => {
            warn!(instrument = %raw.instrument_name, error = %e, "Skipping unusable trade event");
            return;
        }
    };
    match store.upsert_ignore_duplicate(&trade).await {
        Ok(true) => debug!(
            trade_id = %trade.exchange_trade_id,
            instrument = %trade.instrument_name,
            "Stored live trade"
        ),
        Ok(false) => debug!(trade_id = %trade.exchange_trade_id, "Duplicate trade ignored"),
        Err(e) => warn!(trade_id = %trade.exchange_trade_id, error = %e, "Failed to store trade"),
    }
}

/// Extracts the raw trades from a subscription notification on a
/// `trades.*` channel. The exchange delivers `data` as an array; a bare
/// object is accepted as a one-element batch.
fn notification_trades(msg: &Value) -> Option<Vec<RawTrade>> {
    if msg.get("method").and_then(Value::as_str) != Some("subscription") {
        return None;
    }
    let params = msg.get("params")?;
    let channel = params.get("channel").and_then(Value::as_str)?;
    if !channel.starts_with("trades.") {
        return None;
    }

    let data = params.get("data")?;
    match data {
        Value::Array(items) => {
            let mut raws = Vec::with_capacity(items.len());
            for item in items {
                match serde_json::from_value::<RawTrade>(item.clone()) {
                    Ok(raw) => raws.push(raw),
                    Err(e) => warn!(channel, error = %e, "Malformed trade in batch"),
                }
            }
            Some(raws)
        }
        Value::Object(_) => match serde_json::from_value::<RawTrade>(data.clone()) {
            Ok(raw) => Some(vec![raw]),
            Err(e) => {
                warn!(channel, error = %e, "Malformed trade payload");
                Some(Vec::new())
            }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trade_json(id: &str) -> Value {
        json!({
            "instrument_name": "BTC-27FEB26-50000-C",
            "trade_id": id,
            "price": 0.0425,
            "amount": 10.0,
            "direction": "buy",
            "index_price": 49_850.0,
            "iv": 55.0,
            "timestamp": 1_771_581_600_000_i64
        })
    }

    #[test]
    fn test_extracts_array_batches() {
        let msg = json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {
                "channel": "trades.BTC-27FEB26-50000-C.raw",
                "data": [trade_json("1"), trade_json("2")]
            }
        });
        let raws = notification_trades(&msg).unwrap();
        assert_eq!(raws.len(), 2);
    }

    #[test]
    fn test_accepts_single_object_payload() {
        let msg = json!({
            "method": "subscription",
            "params": {
                "channel": "trades.BTC-27FEB26-50000-C.raw",
                "data": trade_json("1")
            }
        });
        let raws = notification_trades(&msg).unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].trade_id_string(), Some("1".to_string()));
    }

    #[test]
    fn test_ignores_other_channels_and_rpc_responses() {
        let heartbeat = json!({
            "method": "subscription",
            "params": { "channel": "ticker.BTC-PERPETUAL.raw", "data": {} }
        });
        assert!(notification_trades(&heartbeat).is_none());

        let response = json!({ "jsonrpc": "2.0", "id": 7, "result": {} });
        assert!(notification_trades(&response).is_none());
    }

    #[test]
    fn test_malformed_entries_are_dropped_not_fatal() {
        let msg = json!({
            "method": "subscription",
            "params": {
                "channel": "trades.BTC-27FEB26-50000-C.raw",
                "data": [trade_json("1"), { "garbage": true }]
            }
        });
        let raws = notification_trades(&msg).unwrap();
        assert_eq!(raws.len(), 1);
    }
}
