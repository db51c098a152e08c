//! Pure portfolio Greeks engine.
//!
//! Converts a trade set into aggregate delta/gamma exposure curves over a
//! price grid. Two mutually exclusive aggregation modes: `flow` (recency
//! weighted, exponential time decay) and `structure` (standing exposure via
//! reconciled OI attribution, no decay). No I/O and no shared state; every
//! function here is safe to call from the presentation layer.

pub mod bs;
pub mod curve;

pub use bs::{bs_delta, bs_gamma, norm_cdf, norm_pdf};
pub use curve::{
    portfolio_delta, portfolio_gamma, price_grid, AggregationMode, CurveParams, ModeParseError,
};
