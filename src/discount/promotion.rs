use serde::{Deserialize, Serialize};

use super::DiscountLevel;

/// Time-bounded override discount layered on top of a listing's base discount.
///
/// A bound of `0` is open: `start_time == 0` means "already started" and
/// `end_time == 0` means "never ends".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromotionRule {
    /// Discount granted while the rule is active.
    pub discount: DiscountLevel,
    /// Unix epoch at which the rule starts, or 0.
    #[serde(default)]
    pub start_time: i64,
    /// Unix epoch at which the rule ends, or 0.
    #[serde(default)]
    pub end_time: i64,
}

impl PromotionRule {
    /// Creates a promotion rule.
    #[must_use]
    pub fn new(discount: DiscountLevel, start_time: i64, end_time: i64) -> Self {
        Self {
            discount,
            start_time,
            end_time,
        }
    }

    /// Returns true iff `start <= now < end`, treating zero bounds as unconstrained.
    #[must_use]
    pub fn is_active(&self, now: i64) -> bool {
        (self.start_time == 0 || self.start_time <= now)
            && (self.end_time == 0 || now < self.end_time)
    }
}

/// Resolves the effective discount for a listing.
///
/// The promotion wins when it is active and either strictly better by
/// [`DiscountLevel::priority`], or equally good but ending later than the base
/// (a zero end time counts as never ending). Otherwise the base stands.
#[must_use]
pub fn resolve_discount(
    base: DiscountLevel,
    base_end_time: i64,
    promotion: Option<&PromotionRule>,
    now: i64,
) -> (DiscountLevel, i64) {
    let Some(rule) = promotion else {
        return (base, base_end_time);
    };
    if !rule.is_active(now) {
        return (base, base_end_time);
    }

    let better = rule.discount.priority() > base.priority();
    let equal_but_longer = rule.discount.priority() == base.priority()
        && open_end(rule.end_time) > open_end(base_end_time);

    if better || equal_but_longer {
        (rule.discount, rule.end_time)
    } else {
        (base, base_end_time)
    }
}

fn open_end(end_time: i64) -> i64 {
    if end_time == 0 { i64::MAX } else { end_time }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_promotion_active_window() {
        let rule = PromotionRule::new(DiscountLevel::Free, NOW - 10, NOW + 10);
        assert!(rule.is_active(NOW));
        assert!(rule.is_active(NOW - 10));
        assert!(!rule.is_active(NOW + 10), "end bound is exclusive");
        assert!(!rule.is_active(NOW - 11));
    }

    #[test]
    fn test_promotion_open_bounds() {
        assert!(PromotionRule::new(DiscountLevel::Free, 0, 0).is_active(NOW));
        assert!(PromotionRule::new(DiscountLevel::Free, 0, NOW + 1).is_active(NOW));
        assert!(PromotionRule::new(DiscountLevel::Free, NOW, 0).is_active(NOW));
    }

    #[test]
    fn test_better_active_promotion_overrides_base() {
        let rule = PromotionRule::new(DiscountLevel::Free, NOW - 100, NOW + 3600);
        let (level, end) = resolve_discount(DiscountLevel::Percent50, NOW + 60, Some(&rule), NOW);
        assert_eq!(level, DiscountLevel::Free);
        assert_eq!(end, NOW + 3600);
    }

    #[test]
    fn test_equal_priority_later_end_extends_window() {
        let t1 = NOW + 100;
        let t2 = NOW + 500;
        let rule = PromotionRule::new(DiscountLevel::Percent50, 0, t2);
        let (level, end) = resolve_discount(DiscountLevel::Percent50, t1, Some(&rule), NOW);
        assert_eq!(level, DiscountLevel::Percent50);
        assert_eq!(end, t2);
    }

    #[test]
    fn test_equal_priority_earlier_end_keeps_base() {
        let rule = PromotionRule::new(DiscountLevel::Percent50, 0, NOW + 50);
        let (_, end) = resolve_discount(DiscountLevel::Percent50, NOW + 100, Some(&rule), NOW);
        assert_eq!(end, NOW + 100);

        let short_free = PromotionRule::new(DiscountLevel::Free, 0, NOW + 50);
        let permanent_base = resolve_discount(DiscountLevel::Free, 0, Some(&short_free), NOW);
        assert_eq!(permanent_base, (DiscountLevel::Free, 0));
    }

    #[test]
    fn test_worse_or_inactive_promotion_ignored() {
        let worse = PromotionRule::new(DiscountLevel::Percent70, 0, 0);
        assert_eq!(
            resolve_discount(DiscountLevel::Free, NOW + 10, Some(&worse), NOW),
            (DiscountLevel::Free, NOW + 10)
        );

        let expired = PromotionRule::new(DiscountLevel::TwoXFree, NOW - 100, NOW - 1);
        assert_eq!(
            resolve_discount(DiscountLevel::None, 0, Some(&expired), NOW),
            (DiscountLevel::None, 0)
        );

        assert_eq!(
            resolve_discount(DiscountLevel::Percent30, 5, None, NOW),
            (DiscountLevel::Percent30, 5)
        );
    }
}
