// Fixed-point helpers shared by the validator, fee calculator and engine

pub mod decimal {
    use rust_decimal::Decimal;

    use crate::models::BPS_DENOMINATOR;

    /// Validate that a price is positive
    pub fn is_valid_price(price: Decimal) -> bool {
        price > Decimal::ZERO
    }

    /// Validate that a quantity is positive
    pub fn is_valid_quantity(quantity: Decimal) -> bool {
        quantity > Decimal::ZERO
    }

    /// True if `value` has no digits below the asset's smallest unit
    pub fn fits_precision(value: Decimal, decimals: u32) -> bool {
        value.normalize().scale() <= decimals
    }

    /// `amount * price`, floored to the quote asset's smallest unit. `None` on overflow.
    pub fn notional(amount: Decimal, price: Decimal, quote_decimals: u32) -> Option<Decimal> {
        floor_mul(amount, price, quote_decimals)
    }

    /// Exact `floor(x * y)` at `decimals` places for non-negative operands.
    ///
    /// The product is formed on 256-bit limbs so digits beyond the 28 that
    /// `Decimal` can hold are truncated, never rounded. `None` for negative
    /// operands or a result that does not fit.
    pub fn floor_mul(x: Decimal, y: Decimal, decimals: u32) -> Option<Decimal> {
        if x.is_sign_negative() || y.is_sign_negative() || decimals > MAX_SCALE {
            return None;
        }
        let mut limbs = mul_wide(x.mantissa().unsigned_abs(), y.mantissa().unsigned_abs());
        let scale = (x.scale() + y.scale()) as i64;
        let shift = scale - decimals as i64;

        if shift >= 0 {
            for step in pow10_steps(shift as u32) {
                div_small(&mut limbs, step);
            }
        } else {
            for step in pow10_steps((-shift) as u32) {
                if !mul_small(&mut limbs, step) {
                    return None;
                }
            }
        }

        if limbs[2] != 0 || limbs[3] != 0 {
            return None;
        }
        let mantissa = (limbs[1] as u128) << 64 | limbs[0] as u128;
        let mantissa = i128::try_from(mantissa).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, decimals)
            .ok()
            .map(|value| value.normalize())
    }

    /// Largest scale `Decimal` supports
    const MAX_SCALE: u32 = 28;

    /// Powers of ten whose product is `10^exp`, each fitting in a `u64`
    fn pow10_steps(mut exp: u32) -> impl Iterator<Item = u64> {
        std::iter::from_fn(move || {
            if exp == 0 {
                return None;
            }
            let step = exp.min(19);
            exp -= step;
            Some(10u64.pow(step))
        })
    }

    /// Little-endian 64-bit limbs of `x * y`
    fn mul_wide(x: u128, y: u128) -> [u64; 4] {
        let xs = [x as u64, (x >> 64) as u64];
        let ys = [y as u64, (y >> 64) as u64];
        let mut out = [0u64; 4];
        for (i, &xi) in xs.iter().enumerate() {
            let mut carry = 0u128;
            for (j, &yj) in ys.iter().enumerate() {
                let t = xi as u128 * yj as u128 + out[i + j] as u128 + carry;
                out[i + j] = t as u64;
                carry = t >> 64;
            }
            out[i + 2] = carry as u64;
        }
        out
    }

    /// Divide in place, truncating
    fn div_small(limbs: &mut [u64; 4], divisor: u64) {
        let mut rem = 0u128;
        for limb in limbs.iter_mut().rev() {
            let cur = rem << 64 | *limb as u128;
            *limb = (cur / divisor as u128) as u64;
            rem = cur % divisor as u128;
        }
    }

    /// Multiply in place. False if the result needs more than 256 bits.
    fn mul_small(limbs: &mut [u64; 4], factor: u64) -> bool {
        let mut carry = 0u128;
        for limb in limbs.iter_mut() {
            let t = *limb as u128 * factor as u128 + carry;
            *limb = t as u64;
            carry = t >> 64;
        }
        carry == 0
    }

    /// A basis-point rate as an exact fraction, e.g. 90 bps -> 0.0090
    pub fn bps_rate(bps: u32) -> Decimal {
        Decimal::new(bps as i64, 4)
    }

    /// Apply a basis-point rate to `value` without rounding. `None` on overflow.
    pub fn apply_bps(value: Decimal, bps: u32) -> Option<Decimal> {
        value
            .checked_mul(Decimal::from(bps))?
            .checked_div(Decimal::from(BPS_DENOMINATOR))
    }

    /// Distance between `price` and `reference` in basis points of `reference`.
    /// `None` when the distance is too large to represent.
    pub fn deviation_bps(price: Decimal, reference: Decimal) -> Option<Decimal> {
        price
            .checked_sub(reference)?
            .abs()
            .checked_mul(Decimal::from(BPS_DENOMINATOR))?
            .checked_div(reference)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use rust_decimal_macros::dec;

        #[test]
        fn test_price_and_quantity_checks() {
            assert!(is_valid_price(dec!(0.0001)));
            assert!(!is_valid_price(dec!(0)));
            assert!(!is_valid_quantity(dec!(-1)));
        }

        #[test]
        fn test_precision() {
            assert!(fits_precision(dec!(1.500000), 1));
            assert!(!fits_precision(dec!(1.25), 1));
            assert!(fits_precision(dec!(100), 0));
        }

        #[test]
        fn test_notional_floors_and_detects_overflow() {
            assert_eq!(notional(dec!(0.333), dec!(1.5), 2), Some(dec!(0.49)));
            assert_eq!(notional(dec!(40), dec!(2), 18), Some(dec!(80)));
            assert_eq!(notional(dec!(3), dec!(0.5), 0), Some(dec!(1)));
            assert_eq!(notional(Decimal::MAX, dec!(2), 18), None);
            assert_eq!(notional(Decimal::MAX, dec!(1), 0), Some(Decimal::MAX));
            assert_eq!(notional(dec!(-1), dec!(2), 2), None);
        }

        #[test]
        fn test_notional_truncates_beyond_decimal_precision() {
            // Exact product is 1 - 1e-36, which a plain multiply rounds up to 1
            let amount = dec!(0.999999999999999999);
            let price = dec!(1.000000000000000001);
            assert_eq!(notional(amount, price, 18), Some(dec!(0.999999999999999999)));
            assert_eq!(notional(amount, price, 0), Some(dec!(0)));
        }

        #[test]
        fn test_floor_mul_wide_product() {
            // 28-digit mantissas whose product needs more than 128 bits
            let x = dec!(12345678901234.567890123456789);
            let y = dec!(78765432109876.543210987654321);
            assert_eq!(floor_mul(x, y, 1), Some(dec!(972412733345526594459381191.5)));
            // Six places would need a 31-digit mantissa
            assert_eq!(floor_mul(x, y, 6), None);
        }

        #[test]
        fn test_bps_helpers() {
            assert_eq!(bps_rate(90), dec!(0.009));
            assert_eq!(apply_bps(dec!(80), 90), Some(dec!(0.72)));
            assert_eq!(apply_bps(Decimal::MAX, 10), None);
        }

        #[test]
        fn test_deviation_bps() {
            assert_eq!(deviation_bps(dec!(110), dec!(100)), Some(dec!(1000)));
            assert_eq!(deviation_bps(dec!(95), dec!(100)), Some(dec!(500)));
            let huge = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
            assert_eq!(deviation_bps(huge, dec!(2)), None);
        }
    }
}
