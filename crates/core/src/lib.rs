pub mod config;
pub mod config_loader;
pub mod instrument;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use config_loader::ConfigLoader;
pub use instrument::{parse_instrument, InstrumentParseError, InstrumentSpec};
pub use traits::{SnapshotStore, TradeStore};
pub use types::{OiSnapshot, OptionType, Trade, TradeDirection, TradeFilter};
