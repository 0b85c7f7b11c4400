//! Largest-remainder allocation.
//!
//! Splits an integer discount across weighted basket lines with zero rounding leakage: the sum of
//! the allocations always equals the requested total exactly. Each line first gets
//! `floor(total * weight / Σweights)`, then the remaining units are handed out one at a time to
//! lines in their original order. The rounding bias toward earlier lines is load-bearing: existing
//! order records were computed with this rule and must reproduce bit-for-bit.

use tss_common::MinorUnits;

/// Allocate `total` across `weights` proportionally, leaking nothing to rounding.
///
/// A zero weight sum yields an all-zero allocation regardless of the requested total; callers must
/// not request a discount exceeding the available weight.
pub fn allocate(total: MinorUnits, weights: &[MinorUnits]) -> Vec<MinorUnits> {
    debug_assert!(!total.is_negative(), "allocation total must be non-negative");
    debug_assert!(weights.iter().all(|w| !w.is_negative()), "allocation weights must be non-negative");
    let weight_sum: i64 = weights.iter().map(|w| w.value()).sum();
    if weight_sum == 0 {
        return vec![MinorUnits::default(); weights.len()];
    }
    let total = total.value();
    let mut allocations = weights
        .iter()
        // i128 intermediate so that large baskets cannot overflow the product
        .map(|w| ((total as i128 * w.value() as i128) / weight_sum as i128) as i64)
        .collect::<Vec<_>>();
    let mut remainder = total - allocations.iter().sum::<i64>();
    // zero-weight lines never receive remainder units; an ineligible line must stay at zero
    for (a, w) in allocations.iter_mut().zip(weights) {
        if remainder == 0 {
            break;
        }
        if w.value() > 0 {
            *a += 1;
            remainder -= 1;
        }
    }
    allocations.into_iter().map(MinorUnits::from).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(total: i64, weights: &[i64]) -> Vec<i64> {
        let weights = weights.iter().copied().map(MinorUnits::from).collect::<Vec<_>>();
        allocate(MinorUnits::from(total), &weights).into_iter().map(|m| m.value()).collect()
    }

    #[test]
    fn equal_weights_bias_earlier_lines() {
        assert_eq!(run(100, &[100, 100, 100]), vec![34, 33, 33]);
    }

    #[test]
    fn proportional_split() {
        assert_eq!(run(100, &[300, 300, 400]), vec![30, 30, 40]);
    }

    #[test]
    fn zero_weight_sum_is_a_noop() {
        assert_eq!(run(500, &[0, 0]), vec![0, 0]);
        assert_eq!(run(0, &[]), Vec::<i64>::new());
    }

    #[test]
    fn zero_weight_lines_get_nothing() {
        assert_eq!(run(400, &[428, 0, 572]), vec![172, 0, 228]);
        // the remainder unit skips the leading zero-weight line
        assert_eq!(run(500, &[0, 300, 301]), vec![0, 250, 250]);
    }

    #[test]
    fn sum_is_exact_for_awkward_ratios() {
        for total in [0i64, 1, 7, 99, 100, 101, 12345] {
            for weights in [&[1i64, 2, 3][..], &[17, 0, 5, 83], &[1], &[999_999_999, 1]] {
                let result = run(total, weights);
                assert_eq!(result.iter().sum::<i64>(), total, "total {total}, weights {weights:?}");
                assert!(result.iter().all(|a| *a >= 0));
            }
        }
    }

    #[test]
    fn large_values_do_not_overflow() {
        let result = run(1_000_000_000_000, &[i64::MAX / 4, i64::MAX / 4]);
        assert_eq!(result.iter().sum::<i64>(), 1_000_000_000_000);
    }
}
