//! Wire types for the Deribit v2 API (shared by the WS and REST clients).

use serde::Deserialize;
use serde_json::Value;

/// Error message Deribit returns when the global rate limit is exceeded.
pub const OVERLOAD_MESSAGE: &str = "over_limit";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// REST responses wrap the payload in `{"result": ...}` or `{"error": ...}`.
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    pub instrument_name: String,
    #[serde(default)]
    pub kind: String,
    /// Expiry in epoch milliseconds.
    #[serde(default)]
    pub expiration_timestamp: i64,
}

/// One row of `public/get_book_summary_by_currency`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookSummary {
    pub instrument_name: String,
    #[serde(default)]
    pub open_interest: f64,
}

/// A raw trade event, from either the `trades.*.raw` channel or the
/// trade-history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub instrument_name: String,
    /// String on most endpoints, numeric on some older ones.
    pub trade_id: Value,
    pub price: f64,
    pub amount: f64,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub index_price: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
    /// Execution time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub block_trade_id: Option<String>,
}

impl RawTrade {
    /// Normalizes the trade id to its string form.
    #[must_use]
    pub fn trade_id_string(&self) -> Option<String> {
        match &self.trade_id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// One page of `public/get_last_trades_by_instrument_and_time`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradesPage {
    #[serde(default)]
    pub trades: Vec<RawTrade>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexPriceResult {
    pub index_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_id_normalization() {
        let from_string: RawTrade = serde_json::from_value(serde_json::json!({
            "instrument_name": "BTC-27FEB26-50000-C",
            "trade_id": "137942056",
            "price": 0.0425,
            "amount": 10.0,
            "timestamp": 1_766_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(from_string.trade_id_string(), Some("137942056".to_string()));

        let from_number: RawTrade = serde_json::from_value(serde_json::json!({
            "instrument_name": "BTC-27FEB26-50000-C",
            "trade_id": 137942056,
            "price": 0.0425,
            "amount": 10.0,
            "timestamp": 1_766_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(from_number.trade_id_string(), Some("137942056".to_string()));

        let missing: RawTrade = serde_json::from_value(serde_json::json!({
            "instrument_name": "BTC-27FEB26-50000-C",
            "trade_id": null,
            "price": 0.0425,
            "amount": 10.0,
            "timestamp": 1_766_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(missing.trade_id_string(), None);
    }

    #[test]
    fn test_trades_page_parses_history_payload() {
        let page: TradesPage = serde_json::from_value(serde_json::json!({
            "trades": [{
                "instrument_name": "ETH-3JAN26-2400-P",
                "trade_id": "ETH-22011",
                "price": 0.011,
                "amount": 5.0,
                "direction": "sell",
                "index_price": 2385.2,
                "iv": 62.5,
                "timestamp": 1_766_000_123_456_i64,
                "block_trade_id": null
            }],
            "has_more": true
        }))
        .unwrap();
        assert_eq!(page.trades.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.trades[0].direction.as_deref(), Some("sell"));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let page: TradesPage = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(page.trades.is_empty());
        assert!(!page.has_more);
    }
}
