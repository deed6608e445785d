//! Discount definitions and the evaluation engine.

use chrono::{DateTime, Utc};
use common::{CategoryId, DiscountId, ProductId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the discount applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountKind {
    /// Computed over the whole basket.
    Basket,
    /// Computed over matching product/category lines only.
    Product,
}

/// How the discount amount is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountMethod {
    /// A flat amount in minor units, applied once.
    Fixed,
    /// A percentage of the discount base.
    Percentage,
}

/// Errors from discount evaluation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscountError {
    /// The discount is inactive, outside its window, or used up.
    #[error("discount {code} is not currently valid")]
    Invalid { code: String },

    /// The basket total is below the discount's minimum order value.
    #[error("order total {total} is below the minimum {min_order_value} for discount {code}")]
    MinOrderValueNotMet {
        code: String,
        total: i64,
        min_order_value: i64,
    },

    /// A product discount must target at least one product or category.
    #[error("product discount {code} targets no products or categories")]
    NoTargets { code: String },
}

/// A discount definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    /// Unique identifier.
    pub id: DiscountId,
    /// Unique redemption code.
    pub code: String,
    /// Basket-wide or product-targeted.
    pub kind: DiscountKind,
    /// Fixed amount or percentage.
    pub method: DiscountMethod,
    /// Minor units for `Fixed`, percent for `Percentage`.
    pub value: Decimal,
    /// Minimum pre-discount basket total in minor units (0 = none).
    pub min_order_value: i64,
    /// Cap on the computed amount in minor units (0 = uncapped).
    pub max_discount_value: i64,
    /// Targeted products (Product kind only).
    pub product_ids: Vec<ProductId>,
    /// Targeted categories (Product kind only).
    pub category_ids: Vec<CategoryId>,
    /// Start of the validity window.
    pub starts_at: DateTime<Utc>,
    /// End of the validity window.
    pub ends_at: DateTime<Utc>,
    /// Maximum number of redemptions (0 = unlimited).
    pub usage_limit: u32,
    /// Redemptions so far.
    pub current_usage: u32,
    /// Master switch.
    pub active: bool,
}

impl Discount {
    /// Returns true if the discount may be applied at `now`.
    ///
    /// Requires the active flag, `now` within the validity window, and a
    /// free usage slot when the limit is bounded.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && now >= self.starts_at
            && now <= self.ends_at
            && (self.usage_limit == 0 || self.current_usage < self.usage_limit)
    }

    /// Evaluates the discount against a priced basket.
    ///
    /// Returns the discount amount in minor units, capped by
    /// `max_discount_value` and clamped so it never exceeds the base it was
    /// computed over.
    pub fn evaluate(
        &self,
        basket: &DiscountBasket,
        now: DateTime<Utc>,
    ) -> Result<i64, DiscountError> {
        if !self.is_valid_at(now) {
            return Err(DiscountError::Invalid {
                code: self.code.clone(),
            });
        }

        let total = basket.total();
        if self.min_order_value > 0 && total < self.min_order_value {
            return Err(DiscountError::MinOrderValueNotMet {
                code: self.code.clone(),
                total,
                min_order_value: self.min_order_value,
            });
        }

        let base = match self.kind {
            DiscountKind::Basket => total,
            DiscountKind::Product => {
                if self.product_ids.is_empty() && self.category_ids.is_empty() {
                    return Err(DiscountError::NoTargets {
                        code: self.code.clone(),
                    });
                }
                basket
                    .lines
                    .iter()
                    .filter(|line| self.matches(line))
                    .map(|line| line.subtotal)
                    .sum()
            }
        };

        let raw = match self.method {
            // A fixed product discount applies once to the matched set,
            // not per unit or per line.
            DiscountMethod::Fixed => round_half_up(self.value),
            DiscountMethod::Percentage => {
                round_half_up(Decimal::from(base) * self.value / Decimal::from(100))
            }
        };

        let mut amount = raw.min(base);
        if self.max_discount_value > 0 {
            amount = amount.min(self.max_discount_value);
        }
        Ok(amount.max(0))
    }

    fn matches(&self, line: &BasketLine) -> bool {
        self.product_ids.contains(&line.product_id)
            || line
                .categories
                .iter()
                .any(|c| self.category_ids.contains(c))
    }
}

fn round_half_up(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// A basket prepared for discount evaluation.
///
/// Category membership is resolved by the caller through the catalog
/// collaborator before evaluation, keeping the engine pure.
#[derive(Debug, Clone, Default)]
pub struct DiscountBasket {
    /// The priced lines under evaluation.
    pub lines: Vec<BasketLine>,
}

impl DiscountBasket {
    /// Returns the pre-discount total over all lines, in minor units.
    pub fn total(&self) -> i64 {
        self.lines.iter().map(|line| line.subtotal).sum()
    }
}

/// One priced line of a [`DiscountBasket`].
#[derive(Debug, Clone)]
pub struct BasketLine {
    /// The product on the line.
    pub product_id: ProductId,
    /// Line subtotal in minor units.
    pub subtotal: i64,
    /// Categories the product belongs to.
    pub categories: Vec<CategoryId>,
}

/// A frozen snapshot of an applied discount.
///
/// Attached to a checkout or order; removing or re-applying a discount
/// replaces the snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// The discount definition this snapshot came from.
    pub discount_id: DiscountId,
    /// The redemption code at application time.
    pub code: String,
    /// The computed amount in minor units.
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn basket(lines: Vec<(&str, i64, Vec<&str>)>) -> DiscountBasket {
        DiscountBasket {
            lines: lines
                .into_iter()
                .map(|(product, subtotal, categories)| BasketLine {
                    product_id: ProductId::new(product),
                    subtotal,
                    categories: categories.into_iter().map(CategoryId::new).collect(),
                })
                .collect(),
        }
    }

    fn discount(kind: DiscountKind, method: DiscountMethod, value: &str) -> Discount {
        let now = Utc::now();
        Discount {
            id: DiscountId::new(),
            code: "TEST".into(),
            kind,
            method,
            value: Decimal::from_str(value).unwrap(),
            min_order_value: 0,
            max_discount_value: 0,
            product_ids: Vec::new(),
            category_ids: Vec::new(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: 0,
            current_usage: 0,
            active: true,
        }
    }

    #[test]
    fn basket_percentage_discount() {
        // BASKET10: 10% off two lines totaling 110.00 -> 11.00
        let mut d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        d.code = "BASKET10".into();
        let b = basket(vec![("P1", 6000, vec![]), ("P2", 5000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(1100));
    }

    #[test]
    fn product_fixed_discount_applies_once() {
        // Fixed 20.00 targeting product 1; qty 2 on the line must not double it.
        let mut d = discount(DiscountKind::Product, DiscountMethod::Fixed, "2000");
        d.product_ids = vec![ProductId::new("P1")];
        let b = basket(vec![("P1", 40_000, vec![]), ("P2", 5000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(2000));
    }

    #[test]
    fn product_percentage_discount_with_cap() {
        // 25% of 250.00 = 62.50, capped at 30.00
        let mut d = discount(DiscountKind::Product, DiscountMethod::Percentage, "25");
        d.product_ids = vec![ProductId::new("P1"), ProductId::new("P2")];
        d.max_discount_value = 3000;
        let b = basket(vec![("P1", 10_000, vec![]), ("P2", 15_000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(3000));
    }

    #[test]
    fn product_discount_matches_by_category() {
        let mut d = discount(DiscountKind::Product, DiscountMethod::Percentage, "50");
        d.category_ids = vec![CategoryId::new("books")];
        let b = basket(vec![
            ("P1", 2000, vec!["books"]),
            ("P2", 9000, vec!["garden"]),
        ]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(1000));
    }

    #[test]
    fn product_discount_without_targets_is_rejected() {
        let d = discount(DiscountKind::Product, DiscountMethod::Fixed, "500");
        let b = basket(vec![("P1", 2000, vec![])]);

        assert!(matches!(
            d.evaluate(&b, Utc::now()),
            Err(DiscountError::NoTargets { .. })
        ));
    }

    #[test]
    fn fixed_discount_clamped_to_matched_base() {
        let mut d = discount(DiscountKind::Product, DiscountMethod::Fixed, "5000");
        d.product_ids = vec![ProductId::new("P1")];
        let b = basket(vec![("P1", 2000, vec![]), ("P2", 100_000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(2000));
    }

    #[test]
    fn fixed_discount_with_no_matching_lines_is_zero() {
        let mut d = discount(DiscountKind::Product, DiscountMethod::Fixed, "2000");
        d.product_ids = vec![ProductId::new("P9")];
        let b = basket(vec![("P1", 40_000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(0));
    }

    #[test]
    fn basket_discount_never_exceeds_total() {
        let d = discount(DiscountKind::Basket, DiscountMethod::Fixed, "99999");
        let b = basket(vec![("P1", 5000, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(5000));
    }

    #[test]
    fn percentage_rounds_half_up() {
        // 10% of 1.05 = 0.105 -> 11 minor units
        let d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        let b = basket(vec![("P1", 105, vec![])]);

        assert_eq!(d.evaluate(&b, Utc::now()), Ok(11));
    }

    #[test]
    fn min_order_value_gate() {
        let mut d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        d.min_order_value = 10_000;
        let b = basket(vec![("P1", 9999, vec![])]);

        assert!(matches!(
            d.evaluate(&b, Utc::now()),
            Err(DiscountError::MinOrderValueNotMet { .. })
        ));
    }

    #[test]
    fn inactive_discount_is_invalid() {
        let mut d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        d.active = false;
        let b = basket(vec![("P1", 5000, vec![])]);

        assert!(matches!(
            d.evaluate(&b, Utc::now()),
            Err(DiscountError::Invalid { .. })
        ));
    }

    #[test]
    fn expired_window_is_invalid() {
        let mut d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        d.ends_at = Utc::now() - Duration::days(2);
        let b = basket(vec![("P1", 5000, vec![])]);

        assert!(d.evaluate(&b, Utc::now()).is_err());
    }

    #[test]
    fn exhausted_usage_is_invalid() {
        let mut d = discount(DiscountKind::Basket, DiscountMethod::Percentage, "10");
        d.usage_limit = 5;
        d.current_usage = 5;

        assert!(!d.is_valid_at(Utc::now()));

        d.current_usage = 4;
        assert!(d.is_valid_at(Utc::now()));
    }
}
