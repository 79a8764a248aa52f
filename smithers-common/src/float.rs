//! Chapter number comparison at a fixed decimal precision
//!
//! Upstream sources report chapter numbers as floats ("12.1", "12.10000001").
//! Comparisons go through these helpers so that floating noise never splits
//! one logical chapter into two.

/// Decimal places used for every chapter comparison unless configured otherwise
pub const DEFAULT_CHAPTER_PRECISION: u32 = 1;

fn scale(precision: u32) -> f64 {
    10f64.powi(precision as i32)
}

/// Round `value` to the nearest multiple of 10^-precision
pub fn precision_round(value: f64, precision: u32) -> f64 {
    let factor = scale(precision);
    (value * factor).round() / factor
}

/// Compare two floats at the given decimal precision
///
/// True when both values round to the same step, or when they lie within
/// half a step of each other (12.04 and 12.06 straddle a rounding boundary
/// but are still the same chapter at one decimal place).
pub fn precision_equals(a: f64, b: f64, precision: u32) -> bool {
    if precision_round(a, precision) == precision_round(b, precision) {
        return true;
    }
    (a - b).abs() < 0.5 / scale(precision)
}

/// Integer key of a value rounded at `precision` (e.g. 12.06 at 1 → 121)
///
/// Used as the storage uniqueness key for a chapter number.
pub fn precision_key(value: f64, precision: u32) -> i64 {
    (value * scale(precision)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_one_decimal() {
        assert_eq!(precision_round(10.04, 1), 10.0);
        assert_eq!(precision_round(10.06, 1), 10.1);
        assert_eq!(precision_round(7.0, 1), 7.0);
    }

    #[test]
    fn test_round_to_zero_decimals() {
        assert_eq!(precision_round(3.4, 0), 3.0);
        assert_eq!(precision_round(3.6, 0), 4.0);
    }

    #[test]
    fn test_round_to_two_decimals() {
        assert!((precision_round(1.234, 2) - 1.23).abs() < 1e-12);
    }

    #[test]
    fn test_equals_within_tolerance() {
        assert!(precision_equals(12.04, 12.06, 1));
        assert!(precision_equals(10.0, 10.04, 1));
        assert!(precision_equals(5.5, 5.5, 1));
        assert!(precision_equals(99.1, 99.1000000001, 1));
    }

    #[test]
    fn test_not_equal_when_tenths_differ() {
        assert!(!precision_equals(12.0, 12.1, 1));
        assert!(!precision_equals(1.0, 2.0, 1));
        assert!(!precision_equals(12.0, 12.06, 1));
    }

    #[test]
    fn test_equals_is_symmetric() {
        let pairs = [(12.04, 12.06), (12.0, 12.1), (3.33, 3.31), (0.0, 0.049)];
        for (a, b) in pairs {
            assert_eq!(
                precision_equals(a, b, 1),
                precision_equals(b, a, 1),
                "asymmetric result for ({}, {})",
                a,
                b
            );
        }
    }

    #[test]
    fn test_small_distance_is_always_equal() {
        // Sweep across rounding boundaries with a fixed distance of 0.02
        let mut base = 0.0;
        while base < 20.0 {
            assert!(
                precision_equals(base, base + 0.02, 1),
                "{} vs {} should be equal",
                base,
                base + 0.02
            );
            base += 0.013;
        }
    }

    #[test]
    fn test_precision_key() {
        assert_eq!(precision_key(12.06, 1), 121);
        assert_eq!(precision_key(12.04, 1), 120);
        assert_eq!(precision_key(7.0, 0), 7);
    }
}
