use rust_decimal::Decimal;

use crate::models::FeeConfig;
use crate::utils::decimal::{apply_bps, bps_rate, floor_mul};

/// Fee charged on a fill's quote notional.
///
/// `floor(notional * max(0, base - discount) / 10_000)` at the quote asset's
/// precision. Dust below the smallest unit stays with the trader. `None` if
/// the fee cannot be represented.
pub fn compute_fee(notional: Decimal, fee: &FeeConfig, decimals: u32) -> Option<Decimal> {
    if notional <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    floor_mul(notional, bps_rate(fee.effective_bps()), decimals)
}

/// Upper bound a fee may reach: the undiscounted base rate, unrounded
pub fn max_fee(notional: Decimal, fee: &FeeConfig) -> Option<Decimal> {
    apply_bps(notional, fee.base_bps)
}

/// Total fees collected from a list of fees
pub fn total_fees<'a>(fees: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
    fees.into_iter().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TraderId;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;

    fn config(base_bps: u32, discount_bps: u32) -> FeeConfig {
        FeeConfig::new(base_bps, discount_bps, TraderId::new("treasury"))
    }

    #[test]
    fn test_discounted_fee() {
        // 40 units at price 2 with 100 bps base and 10 bps discount
        let fee = compute_fee(dec!(80), &config(100, 10), 18);
        assert_eq!(fee, Some(dec!(0.72)));
    }

    #[test]
    fn test_fee_floors_to_precision() {
        // 0.9% of 1.23 = 0.01107
        let fee = compute_fee(dec!(1.23), &config(100, 10), 2);
        assert_eq!(fee, Some(dec!(0.01)));

        let fee = compute_fee(dec!(1.23), &config(100, 10), 0);
        assert_eq!(fee, Some(dec!(0)));
    }

    #[test]
    fn test_discount_above_base_is_free() {
        assert_eq!(compute_fee(dec!(1000), &config(10, 50), 18), Some(Decimal::ZERO));
    }

    #[test]
    fn test_zero_notional() {
        assert_eq!(compute_fee(Decimal::ZERO, &config(100, 0), 18), Some(Decimal::ZERO));
    }

    #[test]
    fn test_fee_bounds_and_monotonic_in_discount() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let notional = Decimal::new(rng.random_range(1..10_000_000_i64), 3);
            let base = rng.random_range(0..=1_000_u32);
            let decimals = rng.random_range(0..=18_u32);

            let mut previous = None;
            for discount in (0..=base + 100).step_by(25) {
                let cfg = config(base, discount);
                let fee = compute_fee(notional, &cfg, decimals).unwrap();
                assert!(fee >= Decimal::ZERO);
                assert!(fee <= max_fee(notional, &cfg).unwrap());
                if let Some(prev) = previous {
                    assert!(fee <= prev);
                }
                previous = Some(fee);
            }
        }
    }

    #[test]
    fn test_fee_on_largest_notional() {
        // The rate is at most one, so the fee always fits even when the
        // unrounded bps product would not
        let fee = compute_fee(Decimal::MAX, &config(100, 10), 0).unwrap();
        assert!(fee > Decimal::ZERO && fee < Decimal::MAX);
        assert_eq!(max_fee(Decimal::MAX, &config(100, 10)), None);
    }

    #[test]
    fn test_total_fees() {
        let fees = [dec!(0.72), dec!(1.08)];
        assert_eq!(total_fees(&fees), dec!(1.80));
    }
}
