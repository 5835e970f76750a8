use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raised when a stored or submitted label does not name a known variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a fieldless enum that is stored and transmitted as a fixed label.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

text_enum!(
    /// Account role. `Banned` accounts cannot sign in.
    Role {
        Member => "member",
        Seller => "seller",
        Admin => "admin",
        Banned => "banned",
    }
);

text_enum!(
    /// Loyalty tier derived from lifetime deposits.
    Rank {
        Bronze => "Bronze",
        Silver => "Silver",
        Gold => "Gold",
    }
);

text_enum!(
    DepositStatus {
        Pending => "Pending",
        Success => "Success",
        Failed => "Failed",
        Expired => "Expired",
    }
);

text_enum!(
    DeliveryType {
        Manual => "manual",
        Auto => "auto",
    }
);

text_enum!(
    /// `Balance` vouchers top up the wallet, `Discount` vouchers take a
    /// percentage off a marketplace purchase.
    VoucherKind {
        Balance => "balance",
        Discount => "discount",
    }
);

text_enum!(
    NewsCategory {
        Info => "info",
        Service => "service",
        Maintenance => "maintenance",
        Promo => "promo",
    }
);

text_enum!(
    /// Which roles a news post is meant for.
    NewsAudience {
        All => "all",
        Member => "member",
        Seller => "seller",
    }
);

text_enum!(
    /// The three kinds of resold third-party orders.
    OrderKind {
        Smm => "smm",
        Ppob => "ppob",
        Nokos => "nokos",
    }
);

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_sell(&self) -> bool {
        matches!(self, Role::Seller | Role::Admin)
    }
}

impl NewsAudience {
    /// Whether a viewer with `role` should see posts for this audience.
    pub fn includes(&self, role: Role) -> bool {
        match self {
            NewsAudience::All => true,
            NewsAudience::Member => matches!(role, Role::Member | Role::Admin),
            NewsAudience::Seller => matches!(role, Role::Seller | Role::Admin),
        }
    }
}

pub const DEFAULT_PICTURE: &str = "https://files.catbox.moe/8u328u.png";

/// A registered account with its wallet.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub balance: i64,
    pub profile_pic: String,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    #[sqlx(try_from = "String")]
    pub rank: Rank,
    pub total_deposit: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_earnings: i64,
    pub last_daily_claim: Option<DateTime<Utc>>,
    pub monthly_spend: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What other users get to see about an account.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub profile_pic: String,
    pub is_verified: bool,
    pub rank: Rank,
}

impl From<&User> for PublicProfile {
    fn from(u: &User) -> Self {
        PublicProfile {
            id: u.id,
            username: u.username.clone(),
            fullname: u.fullname.clone(),
            profile_pic: u.profile_pic.clone(),
            is_verified: u.is_verified,
            rank: u.rank,
        }
    }
}

/// A row on the balance leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub rank: Rank,
    pub balance: i64,
    pub total_deposit: i64,
    pub profile_pic: String,
}

impl From<&User> for LeaderboardEntry {
    fn from(u: &User) -> Self {
        LeaderboardEntry {
            username: u.username.clone(),
            rank: u.rank,
            balance: u.balance,
            total_deposit: u.total_deposit,
            profile_pic: u.profile_pic.clone(),
        }
    }
}

/// A wallet top-up paid through the payment gateway.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub status: DepositStatus,
    pub snap_token: Option<String>,
    pub payment_type: Option<String>,
    pub payment_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A digital product listed on the marketplace.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: i64,
    pub category: String,
    pub image: String,
    pub sold: i64,
    #[sqlx(try_from = "String")]
    pub delivery_type: DeliveryType,
    /// Only revealed to buyers after payment.
    #[serde(skip_serializing)]
    pub delivery_content: Option<String>,
    pub average_rating: f64,
    pub flash_sale_price: i64,
    pub flash_sale_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn flash_sale_active(&self, now: DateTime<Utc>) -> bool {
        self.flash_sale_price > 0 && self.flash_sale_end.is_some_and(|end| end > now)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A completed marketplace sale.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub price: i64,
    pub delivery_content: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Voucher {
    pub id: Uuid,
    pub code: String,
    #[sqlx(try_from = "String")]
    pub kind: VoucherKind,
    /// Rupiah for balance vouchers, percent for discount vouchers.
    pub value: i64,
    pub min_purchase: i64,
    /// Zero means uncapped.
    pub max_discount: i64,
    pub quota: i64,
    pub used_by: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Whether `user` may still claim this voucher at `now`.
    pub fn claimable_by(&self, user: Uuid, now: DateTime<Utc>) -> bool {
        self.quota > 0 && self.expires_at > now && !self.used_by.contains(&user)
    }
}

/// A social-media boost order placed with the SMM vendor.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SmmOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_order_id: String,
    pub service_id: String,
    pub service_name: String,
    pub target_link: String,
    pub quantity: i64,
    pub price: i64,
    pub start_count: i64,
    pub remains: i64,
    pub status: String,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bill payment or top-up placed with the PPOB vendor.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PpobOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_order_id: String,
    pub service_code: String,
    pub product_name: String,
    pub target_number: String,
    pub price: i64,
    pub sn: String,
    pub note: Option<String>,
    pub status: String,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rented virtual number waiting for an OTP.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NokosOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub provider_id: String,
    pub service_name: String,
    pub country_name: String,
    pub phone_number: String,
    pub price: i64,
    pub status: String,
    pub otp_code: String,
    pub refunded: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct News {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub image: Option<String>,
    pub author: String,
    #[sqlx(try_from = "String")]
    pub category: NewsCategory,
    #[sqlx(try_from = "String")]
    pub audience: NewsAudience,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Site-wide presentation and maintenance switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct SiteSettings {
    pub website_title: String,
    pub website_logo: String,
    pub website_favicon: String,
    pub is_maintenance: bool,
    pub maintenance_message: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        SiteSettings {
            website_title: "Wanzofc Shop".to_string(),
            website_logo: DEFAULT_PICTURE.to_string(),
            website_favicon: DEFAULT_PICTURE.to_string(),
            is_maintenance: false,
            maintenance_message: "Website sedang maintenance.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn labels_round_trip_through_strings() {
        assert_eq!("Gold".parse::<Rank>().unwrap(), Rank::Gold);
        assert_eq!(Role::Seller.as_str(), "seller");
        assert!("gold".parse::<Rank>().is_err());
        assert_eq!(
            serde_json::to_string(&DepositStatus::Pending).unwrap(),
            "\"Pending\""
        );
    }

    #[test]
    fn audience_visibility_follows_role() {
        assert!(NewsAudience::All.includes(Role::Member));
        assert!(NewsAudience::Seller.includes(Role::Seller));
        assert!(!NewsAudience::Seller.includes(Role::Member));
        assert!(NewsAudience::Member.includes(Role::Admin));
    }

    #[test]
    fn voucher_claimability() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let mut v = Voucher {
            id: Uuid::new_v4(),
            code: "HEMAT".into(),
            kind: VoucherKind::Discount,
            value: 10,
            min_purchase: 0,
            max_discount: 0,
            quota: 1,
            used_by: vec![],
            expires_at: now + Duration::days(1),
            created_at: now,
        };
        assert!(v.claimable_by(user, now));
        v.used_by.push(user);
        assert!(!v.claimable_by(user, now));
        v.used_by.clear();
        v.quota = 0;
        assert!(!v.claimable_by(user, now));
        v.quota = 3;
        assert!(!v.claimable_by(user, now + Duration::days(2)));
    }
}
