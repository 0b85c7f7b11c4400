//! Coupon scope resolution.
//!
//! A coupon scope restricts which basket lines count toward the coupon's eligible subtotal. The
//! eligible subtotal sizes the discount upstream (percentage or fixed); once sized, the discount
//! is allocated across the full basket by the points engine. Scoping is a sizing input only.

use tss_common::MinorUnits;

use crate::db_types::{BasketLine, CouponScope};

/// A line is eligible unless a non-empty product dimension excludes its product, or a non-empty
/// variant dimension excludes its variant. The two dimension checks are independent ANDs.
pub fn is_coupon_applicable_to_line(scope: &CouponScope, line: &BasketLine) -> bool {
    let product_ok = scope.allowed_product_ids.is_empty()
        || line.product_id.as_ref().is_some_and(|id| scope.allowed_product_ids.contains(id));
    let variant_ok = scope.allowed_variant_ids.is_empty()
        || line.variant_id.as_ref().is_some_and(|id| scope.allowed_variant_ids.contains(id));
    product_ok && variant_ok
}

/// Sum of `price` over the lines the coupon may discount.
pub fn coupon_eligible_subtotal(scope: &CouponScope, lines: &[BasketLine]) -> MinorUnits {
    lines.iter().filter(|l| is_coupon_applicable_to_line(scope, l)).map(|l| l.price).sum()
}

#[cfg(test)]
mod test {
    use super::*;

    fn line(product: Option<&str>, variant: Option<&str>) -> BasketLine {
        BasketLine {
            category: "ticket".to_string(),
            product_id: product.map(String::from),
            variant_id: variant.map(String::from),
            price: MinorUnits::from(1000),
        }
    }

    #[test]
    fn empty_scope_is_unrestricted() {
        let scope = CouponScope::unrestricted();
        assert!(is_coupon_applicable_to_line(&scope, &line(None, None)));
        assert!(is_coupon_applicable_to_line(&scope, &line(Some("p1"), Some("v1"))));
    }

    #[test]
    fn both_dimensions_must_pass() {
        let mut scope = CouponScope::for_products(["p1"]);
        scope.allowed_variant_ids.insert("v1".to_string());
        assert!(is_coupon_applicable_to_line(&scope, &line(Some("p1"), Some("v1"))));
        // matching product but wrong variant is not enough
        assert!(!is_coupon_applicable_to_line(&scope, &line(Some("p1"), Some("v2"))));
        assert!(!is_coupon_applicable_to_line(&scope, &line(Some("p2"), Some("v1"))));
    }

    #[test]
    fn restricted_dimension_rejects_missing_ids() {
        let scope = CouponScope::for_products(["p1"]);
        assert!(!is_coupon_applicable_to_line(&scope, &line(None, None)));
        assert!(is_coupon_applicable_to_line(&scope, &line(Some("p1"), None)));
    }

    #[test]
    fn eligible_subtotal_sums_passing_lines() {
        let scope = CouponScope::for_products(["p1"]);
        let lines = vec![line(Some("p1"), None), line(Some("p2"), None), line(Some("p1"), Some("v9"))];
        assert_eq!(coupon_eligible_subtotal(&scope, &lines), MinorUnits::from(2000));
        assert_eq!(coupon_eligible_subtotal(&CouponScope::unrestricted(), &lines), MinorUnits::from(3000));
    }
}
