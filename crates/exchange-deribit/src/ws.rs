//! Raw WebSocket transport to the exchange.
//!
//! Connection loss is surfaced to the caller; reconnect policy belongs to
//! the ingestion pipeline, not this layer.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const PING_INTERVAL: Duration = Duration::from_secs(20);

pub struct DeribitWs {
    ws_url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    last_ping: Instant,
}

impl DeribitWs {
    #[must_use]
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            stream: None,
            last_ping: Instant::now(),
        }
    }

    /// Opens the WebSocket connection.
    ///
    /// # Errors
    /// Returns error if the connection fails or the server is unreachable.
    pub async fn connect(&mut self) -> Result<()> {
        tracing::debug!("Attempting WebSocket connection to: {}", self.ws_url);

        let (ws_stream, response) = connect_async(&self.ws_url).await.map_err(|e| {
            tracing::error!("WebSocket connection error: {}", e);
            anyhow::anyhow!("Failed to connect to WebSocket at {}: {}", self.ws_url, e)
        })?;

        self.stream = Some(ws_stream);
        self.last_ping = Instant::now();
        tracing::info!(
            "WebSocket connected to {} (HTTP status: {})",
            self.ws_url,
            response.status()
        );
        Ok(())
    }

    /// Sends one JSON payload.
    ///
    /// # Errors
    /// Returns error if the WebSocket is not connected or the send fails.
    pub async fn send_json(&mut self, payload: &serde_json::Value) -> Result<()> {
        if let Some(stream) = &mut self.stream {
            stream.send(Message::Text(payload.to_string())).await?;
            Ok(())
        } else {
            anyhow::bail!("WebSocket not connected")
        }
    }

    /// Time until the next keepalive ping is due.
    fn ping_deadline(&self) -> Duration {
        PING_INTERVAL.saturating_sub(self.last_ping.elapsed())
    }

    /// Receives the next JSON message, transparently handling control frames
    /// and keepalive pings. The read is bounded by the ping deadline so a
    /// fully idle stream still gets pinged on schedule. Returns `None` when
    /// the stream has ended.
    ///
    /// # Errors
    /// Returns error on a closed connection or a malformed text frame.
    pub async fn next_json(&mut self) -> Result<Option<serde_json::Value>> {
        loop {
            if self.ping_deadline().is_zero() {
                self.send_ping().await?;
                self.last_ping = Instant::now();
            }
            let deadline = self.ping_deadline();

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("WebSocket not connected"))?;

            let msg = match tokio::time::timeout(deadline, stream.next()).await {
                // nothing arrived before the ping came due
                Err(_) => continue,
                Ok(None) => return Ok(None),
                Ok(Some(msg)) => msg,
            };

            match msg? {
                Message::Text(text) => {
                    let json: serde_json::Value = serde_json::from_str(&text)?;
                    return Ok(Some(json));
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!("WebSocket control frame");
                }
                Message::Close(frame) => {
                    self.stream = None;
                    anyhow::bail!("WebSocket closed by exchange: {frame:?}");
                }
                _ => {}
            }
        }
    }

    async fn send_ping(&mut self) -> Result<()> {
        if let Some(stream) = &mut self.stream {
            stream.send(Message::Ping(Vec::new())).await?;
            tracing::trace!("Sent keepalive ping");
            Ok(())
        } else {
            anyhow::bail!("WebSocket not connected")
        }
    }
}
