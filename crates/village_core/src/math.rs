//! Fixed-point ratios and mock-safe random draws.
//!
//! Combat and relationship formulas are expressed as fractions of `1`.
//! Using fixed-point keeps them bit-identical across platforms, so a seeded
//! session always replays to the same state hash.
//!
//! Random draws only ever pull raw `u32` words from the generator and map
//! them with a widening multiply. That keeps every helper total even for
//! degenerate generators such as `StepRng`, which tests use to pin outcomes.

use fixed::types::I32F32;
use rand::RngCore;

/// Fixed-point number type for all ratio math.
///
/// 32 integer bits and 32 fractional bits.
pub type Fixed = I32F32;

/// Build a fixed-point fraction from a whole percentage.
#[must_use]
pub fn pct(percent: i32) -> Fixed {
    Fixed::from_num(percent) / Fixed::from_num(100)
}

/// `numerator / denominator` as a fixed-point fraction.
///
/// Returns zero when the denominator is zero.
#[must_use]
pub fn ratio(numerator: u64, denominator: u64) -> Fixed {
    if denominator == 0 {
        return Fixed::ZERO;
    }
    // Scale both sides down together until they fit in the integer part.
    let mut num = numerator;
    let mut den = denominator;
    while den > i32::MAX as u64 {
        num >>= 1;
        den >>= 1;
    }
    Fixed::saturating_from_num(num) / Fixed::from_num(den.max(1))
}

/// Floor of `amount * fraction`, saturating at zero for negative fractions.
#[must_use]
pub fn scale(amount: u64, fraction: Fixed) -> u64 {
    if fraction <= Fixed::ZERO {
        return 0;
    }
    // amount * bits / 2^32, computed wide to avoid overflow.
    let bits = fraction.to_bits() as u128;
    ((u128::from(amount) * bits) >> 32) as u64
}

/// Ceiling of `amount * fraction`.
#[must_use]
pub fn scale_ceil(amount: u64, fraction: Fixed) -> u64 {
    if fraction <= Fixed::ZERO {
        return 0;
    }
    let bits = fraction.to_bits() as u128;
    let product = u128::from(amount) * bits;
    let whole = product >> 32;
    let rem = product & u128::from(u32::MAX);
    (whole + u128::from(rem != 0)) as u64
}

/// Uniform draw in `[0, 1)`.
pub fn unit_interval<R: RngCore + ?Sized>(rng: &mut R) -> Fixed {
    Fixed::from_bits(i64::from(rng.next_u32()))
}

/// Uniform draw in `[low, low + spread)`.
pub fn band<R: RngCore + ?Sized>(rng: &mut R, low: Fixed, spread: Fixed) -> Fixed {
    low + spread * unit_interval(rng)
}

/// Uniform integer in `[0, n)`. Returns zero when `n == 0`.
pub fn roll_below<R: RngCore + ?Sized>(rng: &mut R, n: u32) -> u32 {
    ((u64::from(rng.next_u32()) * u64::from(n)) >> 32) as u32
}

/// Uniform integer in `[low, high]`.
pub fn roll_inclusive<R: RngCore + ?Sized>(rng: &mut R, low: u32, high: u32) -> u32 {
    debug_assert!(low <= high);
    low + roll_below(rng, high - low + 1)
}

/// Bernoulli trial: `true` with probability `p`.
pub fn chance<R: RngCore + ?Sized>(rng: &mut R, p: Fixed) -> bool {
    unit_interval(rng) < p
}

/// Pick a uniformly random element of a slice.
pub fn pick<'a, T, R: RngCore + ?Sized>(rng: &mut R, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let len = u32::try_from(items.len()).unwrap_or(u32::MAX);
    items.get(roll_below(rng, len) as usize)
}

/// Parts per million in one whole.
pub const PPM: u64 = 1_000_000;

/// Floor of `amount * ppm / 1_000_000`, computed on integers.
///
/// Use this for balance losses quoted in whole percents, where a
/// fixed-point fraction such as `pct(15)` sits just under its decimal value
/// and would floor one unit short.
#[must_use]
pub fn scale_ppm(amount: u64, ppm: u64) -> u64 {
    let product = u128::from(amount) * u128::from(ppm) / u128::from(PPM);
    u64::try_from(product).unwrap_or(u64::MAX)
}

/// A fraction in parts per million, rounded to the nearest part.
#[must_use]
pub fn ppm_of(fraction: Fixed) -> u64 {
    (fraction * Fixed::from_num(PPM))
        .round()
        .max(Fixed::ZERO)
        .to_num::<u64>()
}

/// Whole percent of a fraction, floored.
#[must_use]
pub fn whole_percent(fraction: Fixed) -> u32 {
    (fraction * Fixed::from_num(100))
        .floor()
        .max(Fixed::ZERO)
        .to_num::<u32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_pct_and_ratio() {
        assert_eq!(pct(50), Fixed::from_num(0.5));
        assert_eq!(ratio(1, 4), Fixed::from_num(0.25));
        assert_eq!(ratio(5, 0), Fixed::ZERO);
    }

    #[test]
    fn test_ratio_handles_large_values() {
        let r = ratio(3_000_000_000_000, 6_000_000_000_000);
        assert!((r - Fixed::from_num(0.5)).abs() < Fixed::from_num(0.001));
    }

    #[test]
    fn test_scale_floor_and_ceil() {
        assert_eq!(scale(10, pct(25)), 2);
        assert_eq!(scale_ceil(10, pct(25)), 3);
        assert_eq!(scale_ceil(8, pct(25)), 2);
        assert_eq!(scale(100, Fixed::from_num(-1)), 0);
    }

    #[test]
    fn test_degenerate_generators_stay_in_range() {
        let mut low = StepRng::new(0, 0);
        assert_eq!(unit_interval(&mut low), Fixed::ZERO);
        assert_eq!(roll_below(&mut low, 10), 0);
        assert!(chance(&mut low, pct(1)));

        let mut high = StepRng::new(u64::MAX, 0);
        assert!(unit_interval(&mut high) < Fixed::ONE);
        assert_eq!(roll_below(&mut high, 10), 9);
        assert_eq!(roll_inclusive(&mut high, 3, 5), 5);
        assert!(!chance(&mut high, pct(99)));
    }

    #[test]
    fn test_band_bounds() {
        let mut low = StepRng::new(0, 0);
        assert_eq!(band(&mut low, pct(45), pct(10)), pct(45));

        let mut high = StepRng::new(u64::MAX, 0);
        let top = band(&mut high, pct(45), pct(10));
        assert!(top > pct(54));
        assert!(top < pct(56));
    }

    #[test]
    fn test_pick_and_percent() {
        let mut rng = StepRng::new(u64::MAX, 0);
        assert_eq!(pick(&mut rng, &[1, 2, 3]), Some(&3));
        assert_eq!(pick::<u8, _>(&mut rng, &[]), None);
        assert_eq!(whole_percent(ratio(3, 8)), 37);
        assert_eq!(whole_percent(Fixed::ONE), 100);
    }

    // =========================================================================
    // Integer percentages
    // =========================================================================

    #[test]
    fn test_scale_ppm_is_exact_where_fixed_floors_short() {
        assert_eq!(scale(1_000, pct(15)), 149);
        assert_eq!(scale_ppm(1_000, 150_000), 150);
        assert_eq!(scale_ppm(2_000, 150_000), 300);
        assert_eq!(scale_ppm(999, 150_000), 149);
        assert_eq!(scale_ppm(u64::MAX, PPM), u64::MAX);
    }

    #[test]
    fn test_ppm_of_rounds_to_nearest_part() {
        assert_eq!(ppm_of(pct(15)), 150_000);
        assert_eq!(ppm_of(pct(40)), 400_000);
        assert_eq!(ppm_of(Fixed::ONE), PPM);
        assert_eq!(ppm_of(Fixed::from_num(-1)), 0);
    }
}
