pub mod cache;
pub mod client;
pub mod pacer;
pub mod rest;
pub mod types;
pub mod ws;

pub use cache::TtlCache;
pub use client::{DeribitClient, SubscribeReport};
pub use pacer::RequestPacer;
pub use rest::DeribitRest;
pub use types::{BookSummary, Instrument, RawTrade, TradesPage};
pub use ws::DeribitWs;
