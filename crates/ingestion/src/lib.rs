//! Trade ingestion: the live WebSocket consumer and the REST backfill
//! synchronizer. Both write through the same deduplicating store, so they
//! can run concurrently without coordination.

pub mod backfill;
pub mod convert;
pub mod live;

pub use backfill::{run_backfill, BackfillStats, TradeHistory};
pub use convert::raw_to_trade;
pub use live::run_live;
