//! Price Oracle Module
//!
//! - `clock` - Time source shared with the engine
//! - `price_oracle` - Per-pair latest quote with staleness and confidence checks

pub mod clock;
pub mod price_oracle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use price_oracle::{
    OracleConfig, OracleError, PriceOracle, PriceQuote, QuoteSource, QuoteUsability, QuoteView,
    MAX_CONFIDENCE,
};
