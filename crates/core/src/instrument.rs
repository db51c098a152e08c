//! Exchange instrument-name parsing.
//!
//! Deribit option names follow `UNDERLYING-EXPIRY-STRIKE-LETTER`, e.g.
//! `BTC-27FEB26-50000-C`. Expiry codes are `%d%b%y` and contracts settle
//! at 08:00 UTC on expiry day.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::types::OptionType;

/// Hour of day (UTC) at which Deribit options expire.
pub const EXPIRY_HOUR_UTC: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstrumentParseError {
    #[error("instrument name `{0}` is not of the form UNDERLYING-EXPIRY-STRIKE-TYPE")]
    Malformed(String),
    #[error("invalid expiry code `{0}`")]
    BadExpiry(String),
    #[error("invalid strike `{0}`")]
    BadStrike(String),
    #[error("unknown option letter `{0}` (expected C or P)")]
    BadOptionLetter(String),
}

/// Structured view of an option instrument name.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSpec {
    pub underlying: String,
    pub expiry: DateTime<Utc>,
    pub strike: f64,
    pub option_type: OptionType,
}

/// Parses an exchange-native option name into its components.
///
/// # Errors
/// Returns a typed error for malformed names; callers inside batch loops are
/// expected to log and skip rather than abort.
pub fn parse_instrument(name: &str) -> Result<InstrumentSpec, InstrumentParseError> {
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() != 4 {
        return Err(InstrumentParseError::Malformed(name.to_string()));
    }

    let underlying = parts[0];
    if underlying.is_empty() {
        return Err(InstrumentParseError::Malformed(name.to_string()));
    }

    let expiry_date = NaiveDate::parse_from_str(parts[1], "%d%b%y")
        .map_err(|_| InstrumentParseError::BadExpiry(parts[1].to_string()))?;
    let expiry_time = NaiveTime::from_hms_opt(EXPIRY_HOUR_UTC, 0, 0)
        .ok_or_else(|| InstrumentParseError::BadExpiry(parts[1].to_string()))?;
    let expiry = expiry_date.and_time(expiry_time).and_utc();

    let strike: f64 = parts[2]
        .parse()
        .map_err(|_| InstrumentParseError::BadStrike(parts[2].to_string()))?;
    if !strike.is_finite() || strike <= 0.0 {
        return Err(InstrumentParseError::BadStrike(parts[2].to_string()));
    }

    let option_type = match parts[3] {
        "C" => OptionType::Call,
        "P" => OptionType::Put,
        other => return Err(InstrumentParseError::BadOptionLetter(other.to_string())),
    };

    Ok(InstrumentSpec {
        underlying: underlying.to_string(),
        expiry,
        strike,
        option_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_btc_call() {
        let spec = parse_instrument("BTC-27FEB26-50000-C").unwrap();
        assert_eq!(spec.underlying, "BTC");
        assert_eq!(spec.strike, 50_000.0);
        assert_eq!(spec.option_type, OptionType::Call);
        assert_eq!(
            spec.expiry,
            Utc.with_ymd_and_hms(2026, 2, 27, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_eth_put_single_digit_day() {
        let spec = parse_instrument("ETH-3JAN26-2400-P").unwrap();
        assert_eq!(spec.underlying, "ETH");
        assert_eq!(spec.option_type, OptionType::Put);
        assert_eq!(
            spec.expiry,
            Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_future_or_missing_parts() {
        assert!(matches!(
            parse_instrument("BTC-PERPETUAL"),
            Err(InstrumentParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_instrument("BTC-27FEB26-50000"),
            Err(InstrumentParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_expiry() {
        assert!(matches!(
            parse_instrument("BTC-99XYZ26-50000-C"),
            Err(InstrumentParseError::BadExpiry(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_strike() {
        assert!(matches!(
            parse_instrument("BTC-27FEB26-abc-C"),
            Err(InstrumentParseError::BadStrike(_))
        ));
        assert!(matches!(
            parse_instrument("BTC-27FEB26-0-C"),
            Err(InstrumentParseError::BadStrike(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_letter() {
        assert!(matches!(
            parse_instrument("BTC-27FEB26-50000-X"),
            Err(InstrumentParseError::BadOptionLetter(_))
        ));
    }
}
