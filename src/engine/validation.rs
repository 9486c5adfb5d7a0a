//! Order validation
//!
//! Economic admission checks run before any escrow is touched. Each check
//! returns the first failure as a `RejectReason` so callers can report
//! what to fix. The market config is passed in as a snapshot; the oracle is
//! the only live dependency.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::models::{AssetId, AssetPair, MarketConfig, OrderSide};
use crate::oracle::{QuoteSource, QuoteUsability};
use crate::utils::decimal::{deviation_bps, fits_precision, is_valid_price, is_valid_quantity};

use super::errors::{OrderBookError, RejectReason};

/// Parameters of an order awaiting admission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest<'a> {
    pub pair: &'a AssetPair,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
    /// Quote-asset value of `amount` at `price`
    pub notional: Decimal,
}

// ============================================================================
// Parameter Checks
// ============================================================================

/// Validate that a quantity is positive
///
/// # Example
/// ```ignore
/// use rust_decimal_macros::dec;
/// assert!(validate_quantity(dec!(100)).is_ok());
/// assert!(validate_quantity(dec!(0)).is_err());
/// ```
pub fn validate_quantity(quantity: Decimal) -> Result<(), OrderBookError> {
    if !is_valid_quantity(quantity) {
        return Err(OrderBookError::InvalidQuantity(format!(
            "Quantity must be positive, got: {}",
            quantity
        )));
    }
    Ok(())
}

/// Validate that a limit price is positive
pub fn validate_price(price: Decimal) -> Result<(), OrderBookError> {
    if !is_valid_price(price) {
        return Err(OrderBookError::InvalidPrice(format!(
            "Price must be positive, got: {}",
            price
        )));
    }
    Ok(())
}

/// `0 <= min_fill <= amount`
pub fn validate_min_fill(amount: Decimal, min_fill: Decimal) -> Result<(), OrderBookError> {
    if min_fill < Decimal::ZERO || min_fill > amount {
        return Err(OrderBookError::InvalidQuantity(format!(
            "Minimum fill must be within [0, {}], got: {}",
            amount, min_fill
        )));
    }
    Ok(())
}

/// Base and quote must differ
pub fn validate_pair(pair: &AssetPair) -> Result<(), OrderBookError> {
    if pair.is_degenerate() {
        return Err(OrderBookError::InvalidPair(format!(
            "Base and quote must differ, got: {}",
            pair
        )));
    }
    Ok(())
}

/// Quantities cannot be finer than the asset's smallest unit
pub fn validate_precision(quantity: Decimal, asset: &AssetId, decimals: u32) -> Result<(), OrderBookError> {
    if !fits_precision(quantity, decimals) {
        return Err(OrderBookError::InvalidQuantity(format!(
            "{} has more than {} decimals for {}",
            quantity, decimals, asset
        )));
    }
    Ok(())
}

/// Shape checks on order parameters, run before any economic validation
pub fn validate_order_params(
    config: &MarketConfig,
    pair: &AssetPair,
    amount: Decimal,
    price: Decimal,
    min_fill: Decimal,
) -> Result<(), OrderBookError> {
    validate_pair(pair)?;
    validate_quantity(amount)?;
    validate_price(price)?;
    validate_min_fill(amount, min_fill)?;
    validate_precision(amount, &pair.base, config.decimals(&pair.base))?;
    Ok(())
}

// ============================================================================
// Individual Validation Functions
// ============================================================================

/// Both assets must be configured and enabled
pub fn validate_tokens_enabled(config: &MarketConfig, pair: &AssetPair) -> Result<(), RejectReason> {
    for asset in [&pair.base, &pair.quote] {
        if !config.is_enabled(asset) {
            return Err(RejectReason::TokenDisabled {
                asset: asset.clone(),
            });
        }
    }
    Ok(())
}

/// Check one asset quantity against that asset's configured bounds
pub fn validate_token_bounds(
    config: &MarketConfig,
    asset: &AssetId,
    quantity: Decimal,
) -> Result<(), RejectReason> {
    let Some(token) = config.token(asset) else {
        return Err(RejectReason::TokenDisabled {
            asset: asset.clone(),
        });
    };
    if !token.contains(quantity) {
        return Err(RejectReason::SizeOutOfBounds {
            asset: asset.clone(),
            quantity,
            min: token.min_size,
            max: token.max_size,
        });
    }
    Ok(())
}

/// Global order size limits, in base-asset units
pub fn validate_order_size(
    config: &MarketConfig,
    base: &AssetId,
    amount: Decimal,
) -> Result<(), RejectReason> {
    if amount < config.min_order_size || amount > config.max_order_size {
        return Err(RejectReason::SizeOutOfBounds {
            asset: base.clone(),
            quantity: amount,
            min: config.min_order_size,
            max: config.max_order_size,
        });
    }
    Ok(())
}

/// `price` must sit within `max_bps` of the oracle reference.
///
/// A deviation too large to represent is out of band.
pub fn validate_deviation(price: Decimal, reference: Decimal, max_bps: u32) -> Result<(), RejectReason> {
    match deviation_bps(price, reference) {
        Some(deviation) if deviation <= Decimal::from(max_bps) => Ok(()),
        deviation => Err(RejectReason::PriceOutOfBand {
            price,
            reference,
            deviation_bps: deviation.unwrap_or(Decimal::MAX),
            max_bps,
        }),
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Admission and fill-time price checks backed by a quote source
#[derive(Clone)]
pub struct OrderValidator {
    quotes: Arc<dyn QuoteSource>,
}

impl OrderValidator {
    pub fn new(quotes: Arc<dyn QuoteSource>) -> Self {
        Self { quotes }
    }

    /// Usable oracle reference price for a pair
    pub fn reference_price(&self, pair: &AssetPair) -> Result<Decimal, RejectReason> {
        let view = self.quotes.get_quote(pair).ok_or(RejectReason::StaleOracle)?;
        match view.usability {
            QuoteUsability::Usable => Ok(view.price),
            QuoteUsability::Stale { .. } => Err(RejectReason::StaleOracle),
            QuoteUsability::LowConfidence {
                confidence,
                minimum,
            } => Err(RejectReason::LowConfidence {
                confidence,
                minimum,
            }),
        }
    }

    /// Full admission check for a new order.
    ///
    /// # Validations Performed
    /// 1. Both assets enabled
    /// 2. Escrowed leg, then counter leg, within per-token bounds
    /// 3. Global min/max order size
    /// 4. Oracle quote usable
    /// 5. Price within the allowed deviation from the oracle
    pub fn validate_order(
        &self,
        config: &MarketConfig,
        request: &OrderRequest<'_>,
    ) -> Result<(), RejectReason> {
        validate_tokens_enabled(config, request.pair)?;

        let rule = request.side.rule();
        for leg in [rule.escrow, rule.proceeds] {
            validate_token_bounds(
                config,
                leg.asset(request.pair),
                leg.quantity(request.amount, request.notional),
            )?;
        }

        validate_order_size(config, &request.pair.base, request.amount)?;
        self.validate_price(config, request.pair, request.price)
    }

    /// Fill-time re-check of an order's stored price against the current quote
    pub fn validate_fill(
        &self,
        config: &MarketConfig,
        pair: &AssetPair,
        price: Decimal,
    ) -> Result<(), RejectReason> {
        self.validate_price(config, pair, price)
    }

    fn validate_price(
        &self,
        config: &MarketConfig,
        pair: &AssetPair,
        price: Decimal,
    ) -> Result<(), RejectReason> {
        let reference = self.reference_price(pair)?;
        validate_deviation(price, reference, config.max_price_deviation_bps)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeeConfig, TokenConfig, TraderId};
    use crate::oracle::{Clock, ManualClock, OracleConfig, PriceOracle};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    struct Fixture {
        oracle: Arc<PriceOracle>,
        clock: Arc<ManualClock>,
        validator: OrderValidator,
        config: MarketConfig,
        pair: AssetPair,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let oracle = Arc::new(
            PriceOracle::new(TraderId::new("admin"), OracleConfig::default(), clock.clone()).unwrap(),
        );
        let pair = AssetPair::new(AssetId::new("WETH"), AssetId::new("USDC"));
        oracle
            .set_quote(&TraderId::new("admin"), pair.clone(), dec!(2), 90, clock.now())
            .unwrap();

        let mut config = MarketConfig::new(
            FeeConfig::new(100, 10, TraderId::new("treasury")),
            dec!(1),
            dec!(1000),
            1000,
        );
        config
            .tokens
            .insert(pair.base.clone(), TokenConfig::new(true, dec!(1), dec!(500)));
        config
            .tokens
            .insert(pair.quote.clone(), TokenConfig::new(true, dec!(1), dec!(800)));

        Fixture {
            validator: OrderValidator::new(oracle.clone()),
            oracle,
            clock,
            config,
            pair,
        }
    }

    fn request(pair: &AssetPair, side: OrderSide, amount: Decimal, price: Decimal) -> OrderRequest<'_> {
        OrderRequest {
            pair,
            side,
            amount,
            price,
            notional: amount * price,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(dec!(100)).is_ok());
        assert!(validate_quantity(dec!(0.001)).is_ok());
        assert!(validate_quantity(dec!(0)).is_err());

        let err = validate_quantity(dec!(-5)).unwrap_err();
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn test_validate_order_params() {
        let f = fixture();
        assert!(validate_order_params(&f.config, &f.pair, dec!(100), dec!(2), dec!(10)).is_ok());
        assert!(validate_order_params(&f.config, &f.pair, dec!(100), dec!(2), dec!(0)).is_ok());

        assert!(matches!(
            validate_order_params(&f.config, &f.pair, dec!(100), dec!(0), dec!(10)),
            Err(OrderBookError::InvalidPrice(_))
        ));
        assert!(matches!(
            validate_order_params(&f.config, &f.pair, dec!(10), dec!(2), dec!(11)),
            Err(OrderBookError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_order_params(&f.config, &f.pair, dec!(10), dec!(2), dec!(-1)),
            Err(OrderBookError::InvalidQuantity(_))
        ));

        let same = AssetPair::new(f.pair.base.clone(), f.pair.base.clone());
        assert!(matches!(
            validate_order_params(&f.config, &same, dec!(10), dec!(2), dec!(1)),
            Err(OrderBookError::InvalidPair(_))
        ));
    }

    #[test]
    fn test_validate_precision() {
        let weth = AssetId::new("WETH");
        assert!(validate_precision(dec!(1.25), &weth, 2).is_ok());
        assert!(validate_precision(dec!(1.255), &weth, 2).is_err());
    }

    #[test]
    fn test_accepts_sound_order() {
        let f = fixture();
        let req = request(&f.pair, OrderSide::Sell, dec!(100), dec!(2));
        assert!(f.validator.validate_order(&f.config, &req).is_ok());
    }

    #[test]
    fn test_disabled_token() {
        let mut f = fixture();
        f.config.tokens.get_mut(&f.pair.quote).unwrap().enabled = false;
        let req = request(&f.pair, OrderSide::Sell, dec!(100), dec!(2));
        assert_eq!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::TokenDisabled {
                asset: f.pair.quote.clone()
            })
        );
    }

    #[test]
    fn test_unconfigured_token_is_disabled() {
        let f = fixture();
        let pair = AssetPair::new(AssetId::new("DOGE"), f.pair.quote.clone());
        let req = request(&pair, OrderSide::Buy, dec!(10), dec!(2));
        assert!(matches!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::TokenDisabled { .. })
        ));
    }

    #[test]
    fn test_token_bounds_on_both_legs() {
        let f = fixture();

        // Base leg above its 500 max
        let req = request(&f.pair, OrderSide::Sell, dec!(600), dec!(1));
        assert!(matches!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::SizeOutOfBounds { ref asset, .. }) if *asset == f.pair.base
        ));

        // Implied notional 900 above the quote leg's 800 max
        let req = request(&f.pair, OrderSide::Buy, dec!(450), dec!(2));
        assert!(matches!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::SizeOutOfBounds { ref asset, .. }) if *asset == f.pair.quote
        ));
    }

    #[test]
    fn test_global_minimum() {
        let mut f = fixture();
        f.config.min_order_size = dec!(50);
        let req = request(&f.pair, OrderSide::Sell, dec!(10), dec!(2));
        assert!(matches!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::SizeOutOfBounds { min, .. }) if min == dec!(50)
        ));
    }

    #[test]
    fn test_missing_and_stale_quotes() {
        let f = fixture();
        let other = AssetPair::new(f.pair.quote.clone(), f.pair.base.clone());
        assert_eq!(f.validator.reference_price(&other), Err(RejectReason::StaleOracle));

        f.clock.advance(Duration::seconds(3601));
        let req = request(&f.pair, OrderSide::Sell, dec!(100), dec!(2));
        assert_eq!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::StaleOracle)
        );
    }

    #[test]
    fn test_low_confidence() {
        let f = fixture();
        f.oracle
            .set_quote(&TraderId::new("admin"), f.pair.clone(), dec!(2), 40, f.clock.now())
            .unwrap();
        assert_eq!(
            f.validator.validate_fill(&f.config, &f.pair, dec!(2)),
            Err(RejectReason::LowConfidence {
                confidence: 40,
                minimum: 80
            })
        );
    }

    #[test]
    fn test_price_band() {
        let f = fixture();
        // 10% band around 2
        assert!(f.validator.validate_fill(&f.config, &f.pair, dec!(2.2)).is_ok());
        assert!(f.validator.validate_fill(&f.config, &f.pair, dec!(1.8)).is_ok());
        assert!(matches!(
            f.validator.validate_fill(&f.config, &f.pair, dec!(2.21)),
            Err(RejectReason::PriceOutOfBand { max_bps: 1000, .. })
        ));
    }

    #[test]
    fn test_extreme_reference_price_is_out_of_band() {
        let f = fixture();
        let extreme = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        f.oracle
            .set_quote(&TraderId::new("admin"), f.pair.clone(), extreme, 90, f.clock.now())
            .unwrap();

        assert_eq!(
            f.validator.validate_fill(&f.config, &f.pair, dec!(2)),
            Err(RejectReason::PriceOutOfBand {
                price: dec!(2),
                reference: extreme,
                deviation_bps: Decimal::MAX,
                max_bps: 1000,
            })
        );
        assert!(matches!(
            validate_deviation(Decimal::MAX, dec!(0.0000001), 1000),
            Err(RejectReason::PriceOutOfBand { .. })
        ));
    }

    #[test]
    fn test_checks_short_circuit_in_order() {
        let mut f = fixture();
        // Disabled token and stale oracle: token check wins
        f.config.tokens.get_mut(&f.pair.base).unwrap().enabled = false;
        f.clock.advance(Duration::seconds(7200));
        let req = request(&f.pair, OrderSide::Sell, dec!(100), dec!(2));
        assert!(matches!(
            f.validator.validate_order(&f.config, &req),
            Err(RejectReason::TokenDisabled { .. })
        ));
    }
}
