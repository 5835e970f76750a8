//! Persistence for the storefront.
//!
//! Every operation that moves money is a single trait method so that each
//! backend can make it atomic: one database transaction for Postgres, one
//! lock acquisition for the in-memory store.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::types::{
    ChatMessage, Deposit, News, NokosOrder, OrderKind, PpobOrder, Product, Purchase, Review, Role,
    SiteSettings, SmmOrder, User, Voucher, VoucherKind,
};

pub use memory::MemoryStore;
pub use postgres::{PgStore, init_pool};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Marketplace listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    Oldest,
    PriceLow,
    PriceHigh,
    Bestseller,
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
    pub sort: ProductSort,
}

/// Fields an administrator may overwrite on an account.
#[derive(Debug, Clone)]
pub struct AdminUserUpdate {
    pub balance: i64,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Outcome of settling a deposit.
#[derive(Debug, Clone)]
pub struct SettledDeposit {
    pub deposit: Deposit,
    /// The depositor after crediting.
    pub user: User,
    /// Referrer and commission paid, if any.
    pub commission: Option<(Uuid, i64)>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OrderStats {
    pub smm_orders: i64,
    pub ppob_orders: i64,
    /// Sum of SMM and PPOB prices whose provider status is `Success`.
    pub revenue: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Accounts.

    /// Inserts a new account. Duplicate username, email or referral code is
    /// a [`StoreError::Conflict`].
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>>;
    /// All accounts, newest first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn count_users(&self) -> StoreResult<i64>;
    async fn top_users_by_balance(&self, limit: i64) -> StoreResult<Vec<User>>;
    async fn update_profile(
        &self,
        id: Uuid,
        fullname: &str,
        username: &str,
        profile_pic: Option<&str>,
    ) -> StoreResult<User>;
    async fn set_verification_code(&self, id: Uuid, code: Option<&str>) -> StoreResult<()>;
    /// Marks the email verified and clears the pending code.
    async fn mark_verified(&self, id: Uuid) -> StoreResult<()>;
    async fn set_two_factor(&self, id: Uuid, secret: Option<&str>, enabled: bool)
    -> StoreResult<()>;
    async fn admin_update_user(&self, id: Uuid, update: AdminUserUpdate) -> StoreResult<User>;

    // Wallet.

    /// Debits `amount` only if the balance covers it. Returns the new balance,
    /// or `None` when funds are insufficient.
    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<Option<i64>>;
    /// Adds `amount` to the account's monthly spend.
    async fn record_spend(&self, id: Uuid, amount: i64) -> StoreResult<()>;
    /// Credits `amount`, returning the new balance.
    async fn credit(&self, id: Uuid, amount: i64) -> StoreResult<i64>;
    /// Credits `amount` and stamps `now` as the claim time, unless the last
    /// claim is less than `cooldown` old. Returns the new balance if claimed.
    async fn claim_daily_bonus(
        &self,
        id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> StoreResult<Option<i64>>;

    // Deposits.

    async fn create_deposit(&self, deposit: Deposit) -> StoreResult<()>;
    async fn deposit_by_order_id(&self, order_id: &str) -> StoreResult<Option<Deposit>>;
    /// Deposits of one user, newest first.
    async fn deposits_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Deposit>>;
    /// Moves a deposit to `Success` and in the same unit of work credits the
    /// depositor (balance, total deposit, rank) and pays the referral
    /// commission. Returns `None`, changing nothing, if it already succeeded.
    async fn settle_deposit(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Option<SettledDeposit>>;
    /// Moves a `Pending` deposit to `Failed`. Returns `None` if it was not
    /// pending.
    async fn fail_deposit(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Deposit>>;
    async fn record_payment_type(&self, order_id: &str, payment_type: Option<&str>)
    -> StoreResult<()>;

    // Marketplace.

    async fn create_product(&self, product: Product) -> StoreResult<Product>;
    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>>;
    /// Products of one seller, newest first.
    async fn products_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Product>>;
    /// Overwrites the seller-editable fields of `product`.
    async fn update_product(&self, product: &Product) -> StoreResult<Product>;
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;
    async fn set_flash_sale(
        &self,
        id: Uuid,
        price: i64,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Product>;
    /// Adds a review and recomputes the average rating. A second review by
    /// the same user is a [`StoreError::Conflict`].
    async fn add_review(&self, review: Review) -> StoreResult<Product>;
    /// Reviews of a product, newest first.
    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>>;
    /// Debits the buyer, credits the seller, bumps the sold counter and the
    /// buyer's monthly spend and records the purchase. Returns the buyer's
    /// new balance, or `None` without side effects when funds are short.
    async fn settle_purchase(&self, purchase: Purchase) -> StoreResult<Option<i64>>;
    async fn has_purchased(&self, buyer_id: Uuid, product_id: Uuid) -> StoreResult<bool>;
    /// Purchases of one buyer, newest first.
    async fn purchases_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Purchase>>;

    // Vouchers.

    async fn create_voucher(&self, voucher: Voucher) -> StoreResult<Voucher>;
    async fn list_vouchers(&self) -> StoreResult<Vec<Voucher>>;
    async fn voucher_by_code(&self, code: &str, kind: VoucherKind)
    -> StoreResult<Option<Voucher>>;
    /// Takes one unit of quota for `user` if the voucher is still claimable.
    async fn claim_voucher(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>)
    -> StoreResult<bool>;
    /// Undoes a [`Store::claim_voucher`].
    async fn release_voucher(&self, id: Uuid, user_id: Uuid) -> StoreResult<()>;
    /// Claims a balance voucher and credits its value in one unit of work.
    /// Returns the new balance, or `None` if the voucher was not claimable.
    async fn redeem_balance_voucher(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;

    // Provider orders.

    async fn create_smm_order(&self, order: SmmOrder) -> StoreResult<()>;
    /// SMM orders of one user, newest first.
    async fn smm_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SmmOrder>>;
    async fn update_smm_progress(
        &self,
        id: Uuid,
        status: &str,
        start_count: i64,
        remains: i64,
    ) -> StoreResult<()>;
    async fn create_ppob_order(&self, order: PpobOrder) -> StoreResult<()>;
    /// PPOB orders of one user, newest first.
    async fn ppob_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<PpobOrder>>;
    async fn update_ppob_progress(&self, id: Uuid, status: &str, sn: Option<&str>)
    -> StoreResult<()>;
    async fn create_nokos_order(&self, order: NokosOrder) -> StoreResult<()>;
    /// Looks up a number rental by the vendor's order id.
    async fn nokos_order(&self, order_id: &str) -> StoreResult<Option<NokosOrder>>;
    /// Number rentals of one user, newest first.
    async fn nokos_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<NokosOrder>>;
    async fn update_nokos_status(&self, id: Uuid, status: &str, otp_code: &str)
    -> StoreResult<()>;
    /// Flags the order refunded and credits its price to its owner. Returns
    /// the amount refunded, or `None` if it had already been refunded.
    async fn refund_order(&self, kind: OrderKind, id: Uuid) -> StoreResult<Option<i64>>;
    async fn order_stats(&self) -> StoreResult<OrderStats>;
    /// `(smm, ppob)` order counts of one user.
    async fn order_counts_for_user(&self, user_id: Uuid) -> StoreResult<(i64, i64)>;

    // Messaging.

    async fn send_message(&self, message: ChatMessage) -> StoreResult<()>;
    /// Every message sent or received by `user_id`, newest first.
    async fn messages_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatMessage>>;
    /// The thread between two users, oldest first.
    async fn conversation(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<ChatMessage>>;
    /// Marks messages from `sender_id` to `receiver_id` read.
    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> StoreResult<u64>;

    // Content.

    async fn create_news(&self, news: News) -> StoreResult<News>;
    async fn update_news(&self, news: &News) -> StoreResult<News>;
    async fn delete_news(&self, id: Uuid) -> StoreResult<bool>;
    async fn news(&self, id: Uuid) -> StoreResult<Option<News>>;
    async fn news_by_slug(&self, slug: &str) -> StoreResult<Option<News>>;
    /// News newest first, optionally limited.
    async fn list_news(&self, limit: Option<i64>) -> StoreResult<Vec<News>>;
    async fn settings(&self) -> StoreResult<Option<SiteSettings>>;
    async fn save_settings(&self, settings: &SiteSettings) -> StoreResult<()>;
}
