//! The points engine.
//!
//! Turns a basket, an already-sized coupon discount, a tip, and the customer's point balance into
//! a line-by-line discount breakdown plus the points earned by the order. Pure and synchronous; the
//! settlement flow persists the result onto the order session.
//!
//! The ordering of the two allocation passes matters: the coupon discount is spread across the
//! whole basket first, and the points discount is then weighted by each redeemable line's
//! post-coupon remaining value.

use thiserror::Error;
use tss_common::MinorUnits;

use crate::{db_types::{BasketLine, PointsConfigSnapshot}, helpers::allocate};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Invalid settlement input: {0}")]
    Validation(String),
}

//------------------------------------   SettlementBreakdown   -------------------------------------------------------
/// Per-line share of the two discounts, in basket order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBreakdown {
    pub coupon_allocated: MinorUnits,
    pub points_allocated: MinorUnits,
}

/// The full, auditable result of settling a basket. Stored on the order session at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementBreakdown {
    pub lines: Vec<LineBreakdown>,
    pub redeemable_pool: MinorUnits,
    pub max_redeemable_points: i64,
    pub points_reserved: i64,
    pub points_discount: MinorUnits,
    pub earn_pool: MinorUnits,
    pub points_earned: i64,
    pub subtotal: MinorUnits,
    pub total: MinorUnits,
}

/// Settle a basket against the points configuration snapshot.
///
/// `coupon_discount` must already be sized (see [`crate::helpers::coupon_eligible_subtotal`]) and
/// may not exceed the basket subtotal. The tip never participates in the earn or redeem pools.
pub fn settle_basket(
    lines: &[BasketLine],
    coupon_discount: MinorUnits,
    tip: MinorUnits,
    config: &PointsConfigSnapshot,
    available_points: i64,
    use_points: bool,
) -> Result<SettlementBreakdown, SettlementError> {
    if config.point_value.value() <= 0 {
        return Err(SettlementError::Validation(format!(
            "point_value must be strictly positive, got {}",
            config.point_value.value()
        )));
    }
    if coupon_discount.is_negative() || tip.is_negative() {
        return Err(SettlementError::Validation("coupon discount and tip must be non-negative".into()));
    }
    if lines.iter().any(|l| l.price.is_negative()) {
        return Err(SettlementError::Validation("basket line prices must be non-negative".into()));
    }
    if available_points < 0 {
        return Err(SettlementError::Validation("available points must be non-negative".into()));
    }
    let subtotal: MinorUnits = lines.iter().map(|l| l.price).sum();
    if coupon_discount > subtotal {
        return Err(SettlementError::Validation(format!(
            "coupon discount {coupon_discount} exceeds basket subtotal {subtotal}"
        )));
    }

    // Pass 1: the coupon discount is spread across *all* lines by price weight. Scope eligibility
    // sizes the discount upstream; it does not restrict allocation.
    let prices = lines.iter().map(|l| l.price).collect::<Vec<_>>();
    let coupon_allocated = allocate(coupon_discount, &prices);

    let redeemable = |l: &BasketLine| config.redeem_category_keys.contains(&l.category);
    let redeemable_pool: MinorUnits = lines.iter().filter(|l| redeemable(l)).map(|l| l.price).sum();
    let max_redeemable_points = redeemable_pool.value() / config.point_value.value();
    let points_reserved = if use_points { available_points.min(max_redeemable_points) } else { 0 };
    let points_discount = config.point_value * points_reserved;

    // Pass 2: the points discount lands on redeemable lines only, weighted by what the coupon
    // left behind on each of them.
    let point_weights = lines
        .iter()
        .zip(&coupon_allocated)
        .map(|(l, c)| if redeemable(l) { l.price - *c } else { MinorUnits::default() })
        .collect::<Vec<_>>();
    let points_allocated = allocate(points_discount, &point_weights);

    let earn_pool: MinorUnits = lines
        .iter()
        .zip(coupon_allocated.iter().zip(&points_allocated))
        .filter(|(l, _)| config.earn_category_keys.contains(&l.category))
        .map(|(l, (c, p))| l.price - *c - *p)
        .sum();
    let points_earned = earn_pool.value() / config.point_value.value();

    let total = subtotal - coupon_discount - points_discount + tip;
    if total.is_negative() {
        return Err(SettlementError::Validation(format!("settlement drove the order total negative: {total}")));
    }
    let breakdown = lines
        .iter()
        .enumerate()
        .map(|(i, _)| LineBreakdown { coupon_allocated: coupon_allocated[i], points_allocated: points_allocated[i] })
        .collect();
    Ok(SettlementBreakdown {
        lines: breakdown,
        redeemable_pool,
        max_redeemable_points,
        points_reserved,
        points_discount,
        earn_pool,
        points_earned,
        subtotal,
        total,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::PointsConfigSnapshot;

    fn config_100() -> PointsConfigSnapshot {
        PointsConfigSnapshot::new(MinorUnits::from(100))
            .earns(["ticket", "addon"])
            .redeems(["ticket"])
    }

    fn m(v: i64) -> MinorUnits {
        MinorUnits::from(v)
    }

    #[test]
    fn redemption_capped_by_eligible_amount() {
        // two 500p lines, only one redeemable; 9 points available but the pool caps at 5
        let lines = vec![BasketLine::new("ticket", m(500)), BasketLine::new("merch", m(500))];
        let result = settle_basket(&lines, m(0), m(0), &config_100(), 9, true).unwrap();
        assert_eq!(result.redeemable_pool, m(500));
        assert_eq!(result.max_redeemable_points, 5);
        assert_eq!(result.points_reserved, 5);
        assert_eq!(result.points_discount, m(500));
        assert_eq!(result.lines[0].points_allocated, m(500));
        assert_eq!(result.lines[1].points_allocated, m(0));
        assert_eq!(result.total, m(500));
    }

    #[test]
    fn earn_pool_excludes_tip_and_non_earning_lines() {
        // coupon 100 splits evenly over two 500p lines; only the first earns; tip excluded
        let config = PointsConfigSnapshot::new(m(100)).earns(["ticket"]).redeems(["ticket"]);
        let lines = vec![BasketLine::new("ticket", m(500)), BasketLine::new("merch", m(500))];
        let result = settle_basket(&lines, m(100), m(900), &config, 0, false).unwrap();
        assert_eq!(result.lines[0].coupon_allocated, m(50));
        assert_eq!(result.lines[1].coupon_allocated, m(50));
        assert_eq!(result.earn_pool, m(450));
        assert_eq!(result.points_earned, 4);
        assert_eq!(result.total, m(1800));
    }

    #[test]
    fn full_worked_example() {
        // three lines, coupon, partial redemption, earning on the rest
        let config = PointsConfigSnapshot::new(m(100)).earns(["a", "b", "c"]).redeems(["a", "c"]);
        let lines = vec![
            BasketLine::new("a", m(300)),
            BasketLine::new("b", m(300)),
            BasketLine::new("c", m(400)),
        ];
        let result = settle_basket(&lines, m(100), m(0), &config, 4, true).unwrap();
        let coupon = result.lines.iter().map(|l| l.coupon_allocated.value()).collect::<Vec<_>>();
        assert_eq!(coupon, vec![30, 30, 40]);
        assert_eq!(result.points_reserved, 4);
        assert_eq!(result.points_discount, m(400));
        let points = result.lines.iter().map(|l| l.points_allocated.value()).collect::<Vec<_>>();
        assert_eq!(points, vec![172, 0, 228]);
        assert_eq!(result.points_earned, 5);
        assert_eq!(result.total, m(500));
    }

    #[test]
    fn empty_redeem_keys_mean_nothing_is_redeemable() {
        let config = PointsConfigSnapshot::new(m(100)).earns(["ticket"]);
        let lines = vec![BasketLine::new("ticket", m(1000))];
        let result = settle_basket(&lines, m(0), m(0), &config, 50, true).unwrap();
        assert_eq!(result.redeemable_pool, m(0));
        assert_eq!(result.points_reserved, 0);
        assert_eq!(result.points_discount, m(0));
    }

    #[test]
    fn use_points_false_reserves_nothing() {
        let lines = vec![BasketLine::new("ticket", m(1000))];
        let result = settle_basket(&lines, m(0), m(0), &config_100(), 50, false).unwrap();
        assert_eq!(result.points_reserved, 0);
        assert_eq!(result.total, m(1000));
    }

    #[test]
    fn non_positive_point_value_is_rejected() {
        let config = PointsConfigSnapshot::new(m(0));
        let lines = vec![BasketLine::new("ticket", m(1000))];
        assert!(matches!(
            settle_basket(&lines, m(0), m(0), &config, 0, false),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn oversized_coupon_is_rejected_not_clamped() {
        let lines = vec![BasketLine::new("ticket", m(500))];
        assert!(settle_basket(&lines, m(600), m(0), &config_100(), 0, false).is_err());
    }

    #[test]
    fn empty_basket_settles_to_tip_only() {
        let result = settle_basket(&[], m(0), m(250), &config_100(), 10, true).unwrap();
        assert_eq!(result.subtotal, m(0));
        assert_eq!(result.points_reserved, 0);
        assert_eq!(result.points_earned, 0);
        assert_eq!(result.total, m(250));
    }
}
