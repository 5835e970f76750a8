//! Money arithmetic shared by every balance-moving path.
//!
//! Balances are whole rupiah in `i64`. Intermediate prices that involve
//! percentages or per-thousand rates are computed in [`Decimal`] and rounded
//! up to whole rupiah before anything is debited.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::types::{Product, Rank, Voucher};

/// Commission paid to the referrer on every settled deposit.
pub const REFERRAL_COMMISSION_PERCENTAGE: i32 = 5;
/// Lifetime deposit total that promotes an account to Silver.
pub const SILVER_THRESHOLD: i64 = 1_000_000;
/// Lifetime deposit total that promotes an account to Gold.
pub const GOLD_THRESHOLD: i64 = 5_000_000;
pub const SILVER_DISCOUNT_PERCENTAGE: i64 = 2;
pub const GOLD_DISCOUNT_PERCENTAGE: i64 = 5;
pub const MIN_DEPOSIT: i64 = 10_000;
pub const DAILY_BONUS_MIN: i64 = 100;
pub const DAILY_BONUS_MAX: i64 = 500;

pub fn percent_of(amount: i64, percent: i32) -> i64 {
    ((amount as i128 * percent as i128) / 100) as i64
}

pub fn rank_for_total_deposit(total: i64) -> Rank {
    if total >= GOLD_THRESHOLD {
        Rank::Gold
    } else if total >= SILVER_THRESHOLD {
        Rank::Silver
    } else {
        Rank::Bronze
    }
}

/// The price a buyer of `rank` pays for `product` before any voucher.
///
/// An active flash sale replaces the list price and disables the rank
/// discount.
pub fn marketplace_price(product: &Product, rank: Rank, now: DateTime<Utc>) -> Decimal {
    if product.flash_sale_active(now) {
        return Decimal::from(product.flash_sale_price);
    }
    let price = Decimal::from(product.price);
    let discount = match rank {
        Rank::Bronze => 0,
        Rank::Silver => SILVER_DISCOUNT_PERCENTAGE,
        Rank::Gold => GOLD_DISCOUNT_PERCENTAGE,
    };
    price * Decimal::from(100 - discount) / Decimal::ONE_HUNDRED
}

/// Applies a discount voucher to `price`.
///
/// Returns `None` when the price is below the voucher's minimum purchase.
pub fn apply_discount_voucher(price: Decimal, voucher: &Voucher) -> Option<Decimal> {
    if price < Decimal::from(voucher.min_purchase) {
        return None;
    }
    let mut discount = price * Decimal::from(voucher.value) / Decimal::ONE_HUNDRED;
    if voucher.max_discount > 0 && discount > Decimal::from(voucher.max_discount) {
        discount = Decimal::from(voucher.max_discount);
    }
    Some((price - discount).max(Decimal::ZERO))
}

/// Rounds a computed price up to whole rupiah.
pub fn round_up(price: Decimal) -> i64 {
    price.ceil().to_i64().unwrap_or(i64::MAX)
}

/// Price of `quantity` units of an SMM service sold per thousand.
pub fn smm_price(quantity: i64, rate_per_thousand: Decimal) -> i64 {
    round_up(Decimal::from(quantity) * rate_per_thousand / Decimal::ONE_THOUSAND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryType, VoucherKind};
    use chrono::Duration;
    use std::str::FromStr;
    use uuid::Uuid;

    fn product(price: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Ebook".into(),
            slug: "ebook-1".into(),
            description: "desc".into(),
            price,
            category: "ebook".into(),
            image: String::new(),
            sold: 0,
            delivery_type: DeliveryType::Auto,
            delivery_content: None,
            average_rating: 0.0,
            flash_sale_price: 0,
            flash_sale_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn voucher(value: i64, min_purchase: i64, max_discount: i64) -> Voucher {
        let now = Utc::now();
        Voucher {
            id: Uuid::new_v4(),
            code: "DISC".into(),
            kind: VoucherKind::Discount,
            value,
            min_purchase,
            max_discount,
            quota: 10,
            used_by: vec![],
            expires_at: now + Duration::days(1),
            created_at: now,
        }
    }

    #[test]
    fn percent_of_floors() {
        assert_eq!(percent_of(10_000, 5), 500);
        assert_eq!(percent_of(10_010, 5), 500);
        assert_eq!(percent_of(0, 5), 0);
    }

    #[test]
    fn rank_thresholds_are_inclusive() {
        assert_eq!(rank_for_total_deposit(999_999), Rank::Bronze);
        assert_eq!(rank_for_total_deposit(1_000_000), Rank::Silver);
        assert_eq!(rank_for_total_deposit(4_999_999), Rank::Silver);
        assert_eq!(rank_for_total_deposit(5_000_000), Rank::Gold);
    }

    #[test]
    fn rank_discount_applies_without_flash_sale() {
        let now = Utc::now();
        let p = product(10_001);
        assert_eq!(round_up(marketplace_price(&p, Rank::Bronze, now)), 10_001);
        // 10_001 * 0.98 = 9800.98
        assert_eq!(round_up(marketplace_price(&p, Rank::Silver, now)), 9_801);
        // 10_001 * 0.95 = 9500.95
        assert_eq!(round_up(marketplace_price(&p, Rank::Gold, now)), 9_501);
    }

    #[test]
    fn flash_sale_overrides_rank_discount_until_it_ends() {
        let now = Utc::now();
        let mut p = product(50_000);
        p.flash_sale_price = 20_000;
        p.flash_sale_end = Some(now + Duration::hours(1));
        assert_eq!(round_up(marketplace_price(&p, Rank::Gold, now)), 20_000);

        p.flash_sale_end = Some(now - Duration::seconds(1));
        assert_eq!(round_up(marketplace_price(&p, Rank::Gold, now)), 47_500);
    }

    #[test]
    fn discount_voucher_respects_minimum_and_cap() {
        let price = Decimal::from(100_000);
        assert_eq!(
            apply_discount_voucher(price, &voucher(10, 0, 0)),
            Some(Decimal::from(90_000))
        );
        assert_eq!(
            apply_discount_voucher(price, &voucher(50, 0, 5_000)),
            Some(Decimal::from(95_000))
        );
        assert_eq!(apply_discount_voucher(price, &voucher(10, 200_000, 0)), None);
    }

    #[test]
    fn smm_price_is_per_thousand_rounded_up() {
        let rate = Decimal::from_str("12500.5").unwrap();
        assert_eq!(smm_price(1000, rate), 12_501);
        assert_eq!(smm_price(100, Decimal::from(15_000)), 1_500);
        assert_eq!(smm_price(150, Decimal::from(1_001)), 151);
    }
}
