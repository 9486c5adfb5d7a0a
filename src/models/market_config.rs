use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::{AssetId, TraderId};

/// Basis points in one whole (100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default smallest-unit precision, matching 18-decimal fungible tokens
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

/// Trading fee schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub base_bps: u32,
    /// Volume discount subtracted from the base rate
    pub discount_bps: u32,
    pub recipient: TraderId,
}

impl FeeConfig {
    pub fn new(base_bps: u32, discount_bps: u32, recipient: TraderId) -> Self {
        Self {
            base_bps,
            discount_bps,
            recipient,
        }
    }

    /// `max(0, base - discount)`
    pub fn effective_bps(&self) -> u32 {
        self.base_bps.saturating_sub(self.discount_bps)
    }
}

/// Per-asset trading permissions and size bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub enabled: bool,
    pub min_size: Decimal,
    pub max_size: Decimal,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    DEFAULT_TOKEN_DECIMALS
}

impl TokenConfig {
    pub fn new(enabled: bool, min_size: Decimal, max_size: Decimal) -> Self {
        Self {
            enabled,
            min_size,
            max_size,
            decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn contains(&self, quantity: Decimal) -> bool {
        quantity >= self.min_size && quantity <= self.max_size
    }
}

/// Engine-wide economic configuration.
///
/// Every administrative update produces a new version; operations read a
/// snapshot by value when they start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub version: u64,
    pub fee: FeeConfig,
    pub tokens: HashMap<AssetId, TokenConfig>,
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    /// Largest tolerated distance from the oracle price, in basis points
    pub max_price_deviation_bps: u32,
}

impl MarketConfig {
    pub fn new(
        fee: FeeConfig,
        min_order_size: Decimal,
        max_order_size: Decimal,
        max_price_deviation_bps: u32,
    ) -> Self {
        Self {
            version: 0,
            fee,
            tokens: HashMap::new(),
            min_order_size,
            max_order_size,
            max_price_deviation_bps,
        }
    }

    /// Token settings, `None` for assets never configured (treated as disabled)
    pub fn token(&self, asset: &AssetId) -> Option<&TokenConfig> {
        self.tokens.get(asset)
    }

    pub fn is_enabled(&self, asset: &AssetId) -> bool {
        self.token(asset).map(|t| t.enabled).unwrap_or(false)
    }

    /// Smallest unit precision for an asset
    pub fn decimals(&self, asset: &AssetId) -> u32 {
        self.token(asset)
            .map(|t| t.decimals)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::new(
            FeeConfig::new(0, 0, TraderId::new("treasury")),
            dec!(0),
            dec!(1_000_000_000),
            BPS_DENOMINATOR,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_rate_never_negative() {
        let fee = FeeConfig::new(100, 10, TraderId::new("treasury"));
        assert_eq!(fee.effective_bps(), 90);

        let fee = FeeConfig::new(10, 100, TraderId::new("treasury"));
        assert_eq!(fee.effective_bps(), 0);
    }

    #[test]
    fn test_unconfigured_token_is_disabled() {
        let config = MarketConfig::default();
        assert!(!config.is_enabled(&AssetId::new("WETH")));
        assert_eq!(config.decimals(&AssetId::new("WETH")), DEFAULT_TOKEN_DECIMALS);
    }

    #[test]
    fn test_token_bounds() {
        let token = TokenConfig::new(true, dec!(1), dec!(10)).with_decimals(6);
        assert!(token.contains(dec!(1)));
        assert!(token.contains(dec!(10)));
        assert!(!token.contains(dec!(10.5)));
        assert!(!token.contains(dec!(0.5)));
        assert_eq!(token.decimals, 6);
    }
}
