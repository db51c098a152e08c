//! Aggregate exposure curves over a price grid.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use oflow_core::types::Trade;

use crate::bs::{bs_delta, bs_gamma};

/// Rejected aggregation mode string. This is a contract error: callers must
/// validate the mode before any computation starts.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown aggregation mode `{0}` (expected `flow` or `structure`)")]
pub struct ModeParseError(pub String);

/// How trades are weighted when building a curve.
///
/// `Flow` is the recency view: signed size with exponential time decay.
/// `Structure` is the standing-exposure view: reconciled OI attribution with
/// a persistence multiplier and no decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Flow,
    Structure,
}

impl AggregationMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMode::Flow => "flow",
            AggregationMode::Structure => "structure",
        }
    }
}

impl FromStr for AggregationMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(AggregationMode::Flow),
            "structure" => Ok(AggregationMode::Structure),
            other => Err(ModeParseError(other.to_string())),
        }
    }
}

/// Tunables for one curve computation.
#[derive(Debug, Clone)]
pub struct CurveParams {
    pub risk_free_rate: f64,
    /// Time-to-expiry floor in hours (see [`crate::bs`]).
    pub min_time_hours: f64,
    /// Flow-mode decay constant in seconds.
    pub tau_seconds: f64,
    /// Forces `T = 0` for every trade; stress-tests the expiry-day regime.
    pub mock_0dte: bool,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            min_time_hours: 1.0,
            tau_seconds: 14_400.0,
            mock_0dte: false,
        }
    }
}

/// Builds the underlying-price grid `[from, to)` with the given step.
///
/// Non-positive points are dropped: a fixed-width window around a low index
/// price can cross zero, and `ln(S/K)` needs `S > 0`.
#[must_use]
pub fn price_grid(from: f64, to: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || !step.is_finite() || from >= to {
        return Vec::new();
    }
    let mut grid = Vec::with_capacity(((to - from) / step) as usize + 1);
    let mut s = from;
    while s < to {
        if s > 0.0 {
            grid.push(s);
        }
        s += step;
    }
    grid
}

#[derive(Clone, Copy)]
enum Greek {
    Delta,
    Gamma,
}

/// Aggregate delta curve over `grid`, one value per grid point.
///
/// An empty or fully-excluded trade set yields an all-zero curve.
#[must_use]
pub fn portfolio_delta(
    grid: &[f64],
    trades: &[Trade],
    mode: AggregationMode,
    params: &CurveParams,
    now: DateTime<Utc>,
) -> Vec<f64> {
    portfolio_curve(Greek::Delta, grid, trades, mode, params, now)
}

/// Aggregate gamma curve over `grid`, one value per grid point.
#[must_use]
pub fn portfolio_gamma(
    grid: &[f64],
    trades: &[Trade],
    mode: AggregationMode,
    params: &CurveParams,
    now: DateTime<Utc>,
) -> Vec<f64> {
    portfolio_curve(Greek::Gamma, grid, trades, mode, params, now)
}

fn portfolio_curve(
    greek: Greek,
    grid: &[f64],
    trades: &[Trade],
    mode: AggregationMode,
    params: &CurveParams,
    now: DateTime<Utc>,
) -> Vec<f64> {
    let mut total = vec![0.0_f64; grid.len()];

    for trade in trades {
        let Some(term) = trade_term(trade, mode, params, now) else {
            continue;
        };

        for (point, &s) in total.iter_mut().zip(grid.iter()) {
            let g = match greek {
                Greek::Delta => bs_delta(
                    s,
                    trade.strike,
                    term.t,
                    params.risk_free_rate,
                    term.sigma,
                    params.min_time_hours,
                    trade.option_type,
                ),
                Greek::Gamma => bs_gamma(
                    s,
                    trade.strike,
                    term.t,
                    params.risk_free_rate,
                    term.sigma,
                    params.min_time_hours,
                ),
            };
            *point += term.scale * g;
        }
    }

    total
}

struct TradeTerm {
    /// sign * |weight| * decay-or-persistence, applied to every grid point.
    scale: f64,
    t: f64,
    sigma: f64,
}

/// One trade's contribution inputs, or `None` when the trade is excluded.
///
/// A malformed trade (bad strike, non-finite inputs) is skipped with a
/// warning; one bad record must not blank out the whole curve.
fn trade_term(
    trade: &Trade,
    mode: AggregationMode,
    params: &CurveParams,
    now: DateTime<Utc>,
) -> Option<TradeTerm> {
    if !trade.strike.is_finite() || trade.strike <= 0.0 {
        warn!(
            instrument = %trade.instrument_name,
            trade_id = %trade.exchange_trade_id,
            strike = trade.strike,
            "Excluding trade with unusable strike from aggregation"
        );
        return None;
    }

    let sigma = trade.iv_fraction();
    if !sigma.is_finite() {
        warn!(
            instrument = %trade.instrument_name,
            trade_id = %trade.exchange_trade_id,
            "Excluding trade with non-finite implied vol from aggregation"
        );
        return None;
    }

    let t = if params.mock_0dte {
        0.0
    } else {
        trade.years_to_expiry(now)
    };
    if !t.is_finite() {
        warn!(
            instrument = %trade.instrument_name,
            trade_id = %trade.exchange_trade_id,
            "Excluding trade with unusable expiry from aggregation"
        );
        return None;
    }

    let weight = match mode {
        AggregationMode::Flow => trade.amount,
        AggregationMode::Structure => trade.oi_impact.unwrap_or(0.0),
    };
    if weight == 0.0 || !weight.is_finite() {
        return None;
    }

    let multiplier = match mode {
        AggregationMode::Flow => {
            let age = trade.age_seconds(now);
            if age < 0.0 || !age.is_finite() {
                // future-dated or broken timestamp contributes nothing
                return None;
            }
            (-age / params.tau_seconds.max(1e-9)).exp()
        }
        AggregationMode::Structure => persistence(trade),
    };

    let scale = trade.signed_direction() * weight.abs() * multiplier;
    if scale == 0.0 {
        return None;
    }

    Some(TradeTerm { scale, t, sigma })
}

/// Fraction of a trade's notional that became standing open interest.
fn persistence(trade: &Trade) -> f64 {
    match trade.oi_impact {
        None => 1.0,
        Some(impact) => {
            if trade.amount == 0.0 {
                0.0
            } else {
                (impact.abs() / trade.amount.abs().max(1e-6)).min(1.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use oflow_core::types::{OptionType, TradeDirection};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn call_trade(amount: f64, direction: Option<TradeDirection>) -> Trade {
        // expiry ~0.01y out so the decay/floor paths stay realistic
        Trade {
            instrument_name: "BTC-4JAN26-50000-C".to_string(),
            exchange_trade_id: format!("t-{amount}"),
            strike: 50_000.0,
            option_type: OptionType::Call,
            direction,
            amount,
            price: 0.03,
            index_price: 50_000.0,
            implied_vol: 50.0,
            event_time: now(),
            expiration: now() + Duration::hours(88),
            is_block_trade: false,
            block_trade_id: None,
            oi_impact: None,
            oi_reconciled: false,
            active: true,
        }
    }

    #[test]
    fn test_mode_parsing_is_strict() {
        assert_eq!("flow".parse::<AggregationMode>(), Ok(AggregationMode::Flow));
        assert_eq!(
            "structure".parse::<AggregationMode>(),
            Ok(AggregationMode::Structure)
        );
        assert!("FLOW".parse::<AggregationMode>().is_err());
        assert!("net".parse::<AggregationMode>().is_err());
        assert!("".parse::<AggregationMode>().is_err());
    }

    #[test]
    fn test_price_grid_bounds() {
        let grid = price_grid(100.0, 500.0, 100.0);
        assert_eq!(grid, vec![100.0, 200.0, 300.0, 400.0]);
        assert!(price_grid(500.0, 100.0, 100.0).is_empty());
        assert!(price_grid(100.0, 500.0, 0.0).is_empty());
    }

    #[test]
    fn test_price_grid_drops_non_positive_points() {
        let grid = price_grid(-7_000.0, 13_000.0, 5_000.0);
        assert_eq!(grid, vec![3_000.0, 8_000.0]);
        assert!(price_grid(-500.0, 0.0, 100.0).is_empty());
    }

    #[test]
    fn test_low_index_window_stays_finite() {
        // an ETH-scale index with a 10k half-width crosses zero; the curve
        // over the surviving points must be finite everywhere
        let grid = price_grid(3_000.0 - 10_000.0, 3_000.0 + 10_000.0, 1_000.0);
        assert!(!grid.is_empty());
        assert!(grid.iter().all(|s| *s > 0.0));

        let mut trade = call_trade(10.0, Some(TradeDirection::Buy));
        trade.strike = 3_000.0;
        let params = CurveParams::default();
        let delta = portfolio_delta(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &params,
            now(),
        );
        let gamma = portfolio_gamma(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &params,
            now(),
        );
        assert!(delta.iter().all(|d| d.is_finite()));
        assert!(gamma.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_empty_trade_set_yields_zero_curve() {
        let grid = price_grid(40_000.0, 60_000.0, 1_000.0);
        let deltas = portfolio_delta(
            &grid,
            &[],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        assert_eq!(deltas.len(), grid.len());
        assert!(deltas.iter().all(|d| *d == 0.0));
    }

    #[test]
    fn test_flow_netting_of_offsetting_trades() {
        // buy 10 and sell 4 at the same strike/iv: aggregate stays positive
        // but well under ten times a single contract's delta
        let grid = [50_000.0];
        let trades = vec![
            call_trade(10.0, Some(TradeDirection::Buy)),
            call_trade(4.0, Some(TradeDirection::Sell)),
        ];
        let params = CurveParams::default();
        let total = portfolio_delta(&grid, &trades, AggregationMode::Flow, &params, now());

        let single = bs_delta(
            50_000.0,
            50_000.0,
            0.01,
            0.0,
            0.5,
            params.min_time_hours,
            OptionType::Call,
        );
        assert!(total[0] > 0.0);
        assert!(total[0] < 10.0 * single);
    }

    #[test]
    fn test_direction_wins_over_amount_sign() {
        let grid = [50_000.0];
        let mut bought_negative = call_trade(-5.0, Some(TradeDirection::Buy));
        bought_negative.exchange_trade_id = "neg-buy".to_string();
        let total = portfolio_delta(
            &grid,
            &[bought_negative],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        assert!(total[0] > 0.0);

        let undirected_negative = call_trade(-5.0, None);
        let total = portfolio_delta(
            &grid,
            &[undirected_negative],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        assert!(total[0] < 0.0);
    }

    #[test]
    fn test_flow_is_tau_sensitive() {
        let grid = [50_000.0];
        let mut trade = call_trade(10.0, Some(TradeDirection::Buy));
        trade.event_time = now() - Duration::hours(2);

        let fast = CurveParams {
            tau_seconds: 3_600.0,
            ..CurveParams::default()
        };
        let slow = CurveParams {
            tau_seconds: 7_200.0,
            ..CurveParams::default()
        };
        let d_fast = portfolio_delta(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &fast,
            now(),
        );
        let d_slow = portfolio_delta(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &slow,
            now(),
        );
        assert!(d_slow[0] > d_fast[0]);
    }

    #[test]
    fn test_structure_ignores_tau_and_age() {
        let grid = [50_000.0];
        let mut trade = call_trade(10.0, Some(TradeDirection::Buy));
        trade.oi_impact = Some(6.0);
        trade.oi_reconciled = true;

        let base = portfolio_delta(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Structure,
            &CurveParams::default(),
            now(),
        );

        let mut aged = trade.clone();
        aged.event_time = now() - Duration::hours(12);
        let other_tau = CurveParams {
            tau_seconds: 60.0,
            ..CurveParams::default()
        };
        let shifted = portfolio_delta(
            &grid,
            std::slice::from_ref(&aged),
            AggregationMode::Structure,
            &other_tau,
            now(),
        );
        assert!((base[0] - shifted[0]).abs() < 1e-15);
    }

    #[test]
    fn test_structure_persistence_scales_contribution() {
        let grid = [50_000.0];
        let mut full = call_trade(10.0, Some(TradeDirection::Buy));
        full.oi_impact = Some(10.0);
        let mut partial = call_trade(10.0, Some(TradeDirection::Buy));
        partial.oi_impact = Some(5.0);

        let d_full = portfolio_delta(
            &grid,
            std::slice::from_ref(&full),
            AggregationMode::Structure,
            &CurveParams::default(),
            now(),
        );
        let d_partial = portfolio_delta(
            &grid,
            std::slice::from_ref(&partial),
            AggregationMode::Structure,
            &CurveParams::default(),
            now(),
        );
        // impact 5 of 10: half the weight and half the persistence again
        assert!(d_partial[0] > 0.0);
        assert!(d_partial[0] < d_full[0] / 2.0 + 1e-12);
    }

    #[test]
    fn test_structure_skips_unreconciled_trades() {
        let grid = [50_000.0];
        let trade = call_trade(10.0, Some(TradeDirection::Buy));
        assert!(trade.oi_impact.is_none());
        let total = portfolio_delta(
            &grid,
            &[trade],
            AggregationMode::Structure,
            &CurveParams::default(),
            now(),
        );
        assert_eq!(total[0], 0.0);
    }

    #[test]
    fn test_future_dated_trade_contributes_nothing_in_flow() {
        let grid = [50_000.0];
        let mut trade = call_trade(10.0, Some(TradeDirection::Buy));
        trade.event_time = now() + Duration::minutes(5);
        let total = portfolio_delta(
            &grid,
            &[trade],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        assert_eq!(total[0], 0.0);
    }

    #[test]
    fn test_bad_strike_excluded_without_blanking_curve() {
        let grid = [50_000.0];
        let good = call_trade(10.0, Some(TradeDirection::Buy));
        let mut bad = call_trade(3.0, Some(TradeDirection::Buy));
        bad.strike = f64::NAN;

        let with_bad = portfolio_delta(
            &grid,
            &[good.clone(), bad],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        let alone = portfolio_delta(
            &grid,
            &[good],
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        assert!((with_bad[0] - alone[0]).abs() < 1e-15);
    }

    #[test]
    fn test_mock_0dte_forces_expiry_day_regime() {
        let grid = [50_000.0];
        let trade = call_trade(10.0, Some(TradeDirection::Buy));
        let stressed = CurveParams {
            mock_0dte: true,
            ..CurveParams::default()
        };
        let normal = portfolio_gamma(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &CurveParams::default(),
            now(),
        );
        let zero_dte = portfolio_gamma(
            &grid,
            std::slice::from_ref(&trade),
            AggregationMode::Flow,
            &stressed,
            now(),
        );
        // at the floor the ATM gamma spikes well above the 88h-out value
        assert!(zero_dte[0].is_finite());
        assert!(zero_dte[0] > normal[0]);
    }
}
