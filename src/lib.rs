// Library Crate Root
//
// Custodial limit-order book: price oracle, order validation, escrow
// ledger, fee schedule and the engine that ties them together.
pub mod config;
pub mod engine;
pub mod models;
pub mod oracle;
pub mod replay;
pub mod utils;

// pub use = re-export at crate root
pub use config::{ConfigError, EngineSettings, NetworkPreset};
pub use engine::{OrderBookEngine, OrderBookError, RejectReason};
pub use models::{AssetId, AssetPair, Fill, MarketConfig, Order, OrderId, OrderSide, OrderStatus, TraderId};
pub use oracle::{Clock, ManualClock, PriceOracle, SystemClock};
pub use replay::{Command, Replay, Script};
