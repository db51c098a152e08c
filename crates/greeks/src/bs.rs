//! Black-Scholes delta and gamma with small-time and small-vol regularization.
//!
//! Near expiry and at the money the raw formulas blow up (d1 -> ±inf,
//! gamma -> inf), so both time-to-expiry and volatility are floored before
//! use. The floors are configuration-controlled and the floored values are
//! what all callers see; `T = 0, sigma = 0` must produce finite output.

use libm::erf;
use std::f64::consts::SQRT_2;

use oflow_core::types::OptionType;

const INV_SQRT_TWO_PI: f64 = 0.398_942_280_401_432_7;

/// Volatility floor, as a fraction (1bp of vol).
pub const SIGMA_FLOOR: f64 = 1e-4;

const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

#[must_use]
pub fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_TWO_PI * (-0.5 * x * x).exp()
}

/// Floors time-to-expiry (years) and volatility (fraction).
#[must_use]
pub fn effective_inputs(t: f64, sigma: f64, min_time_hours: f64) -> (f64, f64) {
    let t_floor = min_time_hours / HOURS_PER_YEAR;
    (t.max(t_floor), sigma.max(SIGMA_FLOOR))
}

fn d1(s: f64, k: f64, r: f64, sigma_eff: f64, t_eff: f64) -> f64 {
    ((s / k).ln() + (r + 0.5 * sigma_eff * sigma_eff) * t_eff) / (sigma_eff * t_eff.sqrt())
}

/// Black-Scholes delta at one grid point.
///
/// `t` is time to expiry in years and may be zero or negative; `sigma` is a
/// volatility fraction and may be zero. Both are floored internally.
#[must_use]
pub fn bs_delta(s: f64, k: f64, t: f64, r: f64, sigma: f64, min_time_hours: f64, option_type: OptionType) -> f64 {
    let (t_eff, sigma_eff) = effective_inputs(t, sigma, min_time_hours);
    let d1 = d1(s, k, r, sigma_eff, t_eff);
    match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    }
}

/// Black-Scholes gamma at one grid point. Same floor behavior as [`bs_delta`].
#[must_use]
pub fn bs_gamma(s: f64, k: f64, t: f64, r: f64, sigma: f64, min_time_hours: f64) -> f64 {
    let (t_eff, sigma_eff) = effective_inputs(t, sigma, min_time_hours);
    let d1 = d1(s, k, r, sigma_eff, t_eff);
    norm_pdf(d1) / (s * sigma_eff * t_eff.sqrt())
}
