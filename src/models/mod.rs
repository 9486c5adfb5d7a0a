pub mod event;
pub mod fill;
pub mod ids;
pub mod market_config;
pub mod order;

pub use event::{AuditRecord, EngineEvent};
pub use fill::Fill;
pub use ids::{AssetId, AssetPair, OrderId, TraderId};
pub use market_config::{FeeConfig, MarketConfig, TokenConfig, BPS_DENOMINATOR, DEFAULT_TOKEN_DECIMALS};
pub use order::{Order, OrderSide, OrderStatus, PairLeg, SideRule};
