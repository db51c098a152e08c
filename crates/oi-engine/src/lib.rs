//! Open-interest engine: periodic snapshot capture for near-dated
//! instruments and proportional attribution of OI changes back onto the
//! trades that occurred between consecutive snapshots.

pub mod reconcile;
pub mod snapshot;

pub use reconcile::{allocate_impacts, run_reconcile, ReconcileStats};
pub use snapshot::{capture_snapshots, CaptureStats, OiSource};
