//! JSON-RPC client over the WebSocket transport.
//!
//! Owns request pacing and the retry-on-overload policy. Subscription
//! notifications that arrive while a call is awaiting its response are
//! buffered and replayed through `next_event`.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::pacer::RequestPacer;
use crate::types::{AuthResult, Instrument, OVERLOAD_MESSAGE};
use crate::ws::DeribitWs;

const INTER_CHUNK_PAUSE: Duration = Duration::from_millis(100);

pub struct DeribitClient {
    ws: DeribitWs,
    pacer: Arc<RequestPacer>,
    overload_cooldown: Duration,
    next_id: u64,
    pending: VecDeque<Value>,
}

/// Outcome of a chunked subscribe: per-chunk failures are collected here
/// instead of aborting the remaining chunks.
#[derive(Debug, Default)]
pub struct SubscribeReport {
    pub requested_channels: usize,
    pub subscribed_channels: usize,
    pub failed_chunks: Vec<(usize, String)>,
}

impl SubscribeReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty() && self.subscribed_channels == self.requested_channels
    }
}

impl DeribitClient {
    /// Connects the underlying WebSocket.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    pub async fn connect(
        ws_url: String,
        pacer: Arc<RequestPacer>,
        overload_cooldown: Duration,
    ) -> Result<Self> {
        let mut ws = DeribitWs::new(ws_url);
        ws.connect().await?;
        Ok(Self {
            ws,
            pacer,
            overload_cooldown,
            next_id: 1,
            pending: VecDeque::new(),
        })
    }

    /// Issues one JSON-RPC call and returns its `result`.
    ///
    /// Pacing is enforced process-wide before every send. An `over_limit`
    /// error sleeps the fixed cooldown and retries in a loop — unbounded on
    /// sustained overload, each retry logged. Any other exchange error is
    /// returned to the caller without retrying.
    ///
    /// # Errors
    /// Returns error on connection loss or a non-overload exchange error.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        loop {
            self.pacer.pace().await;
            let id = self.next_id;
            self.next_id += 1;

            let request = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            });
            self.ws.send_json(&request).await?;

            let response = self.await_response(id).await?;
            if let Some(error) = response.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if message == OVERLOAD_MESSAGE {
                    warn!(method, cooldown_ms = self.overload_cooldown.as_millis() as u64,
                        "Exchange signaled overload; cooling down and retrying");
                    tokio::time::sleep(self.overload_cooldown).await;
                    continue;
                }
                let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
                anyhow::bail!("exchange error for {method}: code {code}, {message}");
            }

            return Ok(response.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn await_response(&mut self, id: u64) -> Result<Value> {
        loop {
            let msg = self
                .ws
                .next_json()
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection ended while awaiting response {id}"))?;

            if msg.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(msg);
            }
            // a notification raced the response; keep it for next_event
            self.pending.push_back(msg);
        }
    }

    /// Next subscription notification, draining any buffered messages first.
    /// Returns `None` when the stream has ended.
    ///
    /// # Errors
    /// Returns error on connection loss.
    pub async fn next_event(&mut self) -> Result<Option<Value>> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        self.ws.next_json().await
    }

    /// Exchanges credentials for a session token. A failure here is fatal
    /// for this connection attempt.
    ///
    /// # Errors
    /// Returns error if authentication is rejected.
    pub async fn authenticate(&mut self, client_id: &str, client_secret: &str) -> Result<()> {
        let result = self
            .call(
                "public/auth",
                json!({
                    "grant_type": "client_credentials",
                    "client_id": client_id,
                    "client_secret": client_secret,
                }),
            )
            .await
            .context("authentication failed")?;

        let auth: AuthResult =
            serde_json::from_value(result).context("malformed authentication response")?;
        info!(expires_in = auth.expires_in, "Authenticated");
        Ok(())
    }

    /// Lists non-expired option instruments for one underlying.
    ///
    /// # Errors
    /// Returns error if the request fails or the payload is malformed.
    pub async fn fetch_option_instruments(&mut self, currency: &str) -> Result<Vec<Instrument>> {
        let result = self
            .call(
                "public/get_instruments",
                json!({
                    "currency": currency,
                    "kind": "option",
                    "expired": false,
                }),
            )
            .await?;

        let instruments: Vec<Instrument> = serde_json::from_value(result)
            .with_context(|| format!("malformed instrument list for {currency}"))?;
        info!(currency, count = instruments.len(), "Fetched option instruments");
        Ok(instruments)
    }

    /// Subscribes to channels in bounded chunks (the exchange caps the
    /// channel count per call). A failing chunk is recorded and the rest
    /// proceed.
    ///
    /// # Errors
    /// Returns error only on connection loss; exchange-level subscribe
    /// failures land in the report.
    pub async fn subscribe_in_chunks(
        &mut self,
        channels: &[String],
        chunk_size: usize,
    ) -> Result<SubscribeReport> {
        let mut report = SubscribeReport {
            requested_channels: channels.len(),
            ..SubscribeReport::default()
        };
        if channels.is_empty() {
            warn!("No channels to subscribe to");
            return Ok(report);
        }

        let chunk_size = chunk_size.max(1);
        for (index, chunk) in channels.chunks(chunk_size).enumerate() {
            info!(
                chunk = index,
                channels = chunk.len(),
                total = channels.len(),
                "Subscribing chunk"
            );
            match self.call("public/subscribe", json!({ "channels": chunk })).await {
                Ok(_) => report.subscribed_channels += chunk.len(),
                Err(e) => {
                    warn!(chunk = index, error = %e, "Subscribe chunk failed");
                    report.failed_chunks.push((index, e.to_string()));
                }
            }
            tokio::time::sleep(INTER_CHUNK_PAUSE).await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_complete_only_when_everything_subscribed() {
        let full = SubscribeReport {
            requested_channels: 800,
            subscribed_channels: 800,
            failed_chunks: vec![],
        };
        assert!(full.is_complete());

        let partial = SubscribeReport {
            requested_channels: 800,
            subscribed_channels: 400,
            failed_chunks: vec![(1, "exchange error".to_string())],
        };
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_chunking_covers_all_channels() {
        let channels: Vec<String> = (0..1050).map(|i| format!("trades.BTC-{i}.raw")).collect();
        let chunks: Vec<_> = channels.chunks(400).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[2].len(), 250);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 1050);
    }
}
