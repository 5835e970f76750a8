use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction, postgres::PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use super::{
    AdminUserUpdate, OrderStats, ProductQuery, ProductSort, SettledDeposit, Store, StoreError,
    StoreResult,
};
use crate::pricing::{REFERRAL_COMMISSION_PERCENTAGE, percent_of, rank_for_total_deposit};
use crate::types::{
    ChatMessage, Deposit, News, NokosOrder, OrderKind, PpobOrder, Product, Purchase, Review,
    SiteSettings, SmmOrder, User, Voucher, VoucherKind,
};

/// Initializes the database pool and applies the schema.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply schema")?;
    Ok(pool)
}

async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    info!("database schema applied");
    Ok(())
}

/// The production [`Store`], backed by Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// NOTE: 23505 = unique_violation
fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            let field = match db_err.constraint() {
                Some(c) if c.contains("username") => "username",
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("referral_code") => "referral code",
                Some(c) if c.contains("slug") => "slug",
                Some(c) if c.contains("code") => "voucher code",
                Some(c) if c.contains("order_id") => "order id",
                Some(c) if c.starts_with("reviews") => "review",
                _ => "record",
            };
            return StoreError::Conflict(field.to_string());
        }
    }
    StoreError::Database(e)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

async fn user_exists(conn: &mut sqlx::PgConnection, id: Uuid) -> StoreResult<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

async fn credit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
) -> StoreResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"UPDATE users SET balance = balance + $2, updated_at = now()
           WHERE id = $1 RETURNING balance"#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(tx.as_mut())
    .await?;
    row.map(|r| r.0).ok_or(StoreError::NotFound("user"))
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, fullname, username, email, password_hash, role, balance,
                   profile_pic, is_verified, verification_code, two_factor_secret,
                   two_factor_enabled, rank, total_deposit, referral_code, referred_by,
                   referral_earnings, last_daily_claim, monthly_spend, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                   $17, $18, $19, $20, $21)
               RETURNING *"#,
        )
        .bind(user.id)
        .bind(&user.fullname)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.balance)
        .bind(&user.profile_pic)
        .bind(user.is_verified)
        .bind(&user.verification_code)
        .bind(&user.two_factor_secret)
        .bind(user.two_factor_enabled)
        .bind(user.rank.as_str())
        .bind(user.total_deposit)
        .bind(&user.referral_code)
        .bind(&user.referred_by)
        .bind(user.referral_earnings)
        .bind(user.last_daily_claim)
        .bind(user.monthly_spend)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn top_users_by_balance(&self, limit: i64) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as("SELECT * FROM users ORDER BY balance DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn update_profile(
        &self,
        id: Uuid,
        fullname: &str,
        username: &str,
        profile_pic: Option<&str>,
    ) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users SET fullname = $2, username = $3,
                   profile_pic = COALESCE($4, profile_pic), updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(fullname)
        .bind(username)
        .bind(profile_pic)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?
        .ok_or(StoreError::NotFound("user"))
    }

    async fn set_verification_code(&self, id: Uuid, code: Option<&str>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET verification_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET is_verified = TRUE, verification_code = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_two_factor(
        &self,
        id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET two_factor_secret = $2, two_factor_enabled = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(secret)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn admin_update_user(&self, id: Uuid, update: AdminUserUpdate) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users SET balance = $2, role = $3,
                   password_hash = COALESCE($4, password_hash), updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(update.balance)
        .bind(update.role.as_str())
        .bind(update.password_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))
    }

    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<Option<i64>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE users SET balance = balance - $2, updated_at = now()
               WHERE id = $1 AND balance >= $2 RETURNING balance"#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some((balance,)) => Ok(Some(balance)),
            None if user_exists(&mut *conn, id).await? => Ok(None),
            None => Err(StoreError::NotFound("user")),
        }
    }

    async fn record_spend(&self, id: Uuid, amount: i64) -> StoreResult<()> {
        sqlx::query("UPDATE users SET monthly_spend = monthly_spend + $2 WHERE id = $1")
            .bind(id)
            .bind(amount)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn credit(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let balance = credit_in_tx(&mut tx, id, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn claim_daily_bonus(
        &self,
        id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> StoreResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE users SET balance = balance + $2, last_daily_claim = $3
               WHERE id = $1 AND (last_daily_claim IS NULL OR last_daily_claim <= $4)
               RETURNING balance"#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .bind(now - cooldown)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn create_deposit(&self, deposit: Deposit) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO deposits (id, user_id, order_id, amount, status, snap_token,
                   payment_type, payment_time, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(deposit.id)
        .bind(deposit.user_id)
        .bind(&deposit.order_id)
        .bind(deposit.amount)
        .bind(deposit.status.as_str())
        .bind(&deposit.snap_token)
        .bind(&deposit.payment_type)
        .bind(deposit.payment_time)
        .bind(deposit.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(())
    }

    async fn deposit_by_order_id(&self, order_id: &str) -> StoreResult<Option<Deposit>> {
        Ok(sqlx::query_as("SELECT * FROM deposits WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn deposits_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Deposit>> {
        Ok(sqlx::query_as(
            "SELECT * FROM deposits WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn settle_deposit(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Option<SettledDeposit>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent notifications for the same order; the
        // loser re-reads `Success` and updates nothing.
        let deposit: Option<Deposit> = sqlx::query_as(
            r#"UPDATE deposits SET status = 'Success', payment_type = $2, payment_time = $3
               WHERE order_id = $1 AND status <> 'Success' RETURNING *"#,
        )
        .bind(order_id)
        .bind(payment_type)
        .bind(paid_at)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(deposit) = deposit else {
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM deposits WHERE order_id = $1")
                    .bind(order_id)
                    .fetch_optional(tx.as_mut())
                    .await?;
            tx.commit().await?;
            return match exists {
                Some(_) => Ok(None),
                None => Err(StoreError::NotFound("deposit")),
            };
        };

        let (total_deposit,): (i64,) = sqlx::query_as(
            r#"UPDATE users SET balance = balance + $2, total_deposit = total_deposit + $2,
                   updated_at = $3
               WHERE id = $1 RETURNING total_deposit"#,
        )
        .bind(deposit.user_id)
        .bind(deposit.amount)
        .bind(paid_at)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(StoreError::NotFound("user"))?;

        let user: User = sqlx::query_as("UPDATE users SET rank = $2 WHERE id = $1 RETURNING *")
            .bind(deposit.user_id)
            .bind(rank_for_total_deposit(total_deposit).as_str())
            .fetch_one(tx.as_mut())
            .await?;

        let mut commission = None;
        if let Some(code) = user.referred_by.as_deref() {
            let amount = percent_of(deposit.amount, REFERRAL_COMMISSION_PERCENTAGE);
            let upline: Option<(Uuid,)> = sqlx::query_as(
                r#"UPDATE users SET balance = balance + $2,
                       referral_earnings = referral_earnings + $2, updated_at = now()
                   WHERE referral_code = $1 AND id <> $3 RETURNING id"#,
            )
            .bind(code)
            .bind(amount)
            .bind(user.id)
            .fetch_optional(tx.as_mut())
            .await?;
            commission = upline.map(|(id,)| (id, amount));
        }

        tx.commit().await?;
        Ok(Some(SettledDeposit {
            deposit,
            user,
            commission,
        }))
    }

    async fn fail_deposit(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Deposit>> {
        Ok(sqlx::query_as(
            r#"UPDATE deposits SET status = 'Failed', payment_type = $2, payment_time = $3
               WHERE order_id = $1 AND status = 'Pending' RETURNING *"#,
        )
        .bind(order_id)
        .bind(payment_type)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn record_payment_type(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE deposits SET payment_type = $2 WHERE order_id = $1")
            .bind(order_id)
            .bind(payment_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_product(&self, product: Product) -> StoreResult<Product> {
        sqlx::query_as::<_, Product>(
            r#"INSERT INTO products (id, seller_id, name, slug, description, price, category,
                   image, sold, delivery_type, delivery_content, average_rating,
                   flash_sale_price, flash_sale_end, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
               RETURNING *"#,
        )
        .bind(product.id)
        .bind(product.seller_id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(&product.image)
        .bind(product.sold)
        .bind(product.delivery_type.as_str())
        .bind(&product.delivery_content)
        .bind(product.average_rating)
        .bind(product.flash_sale_price)
        .bind(product.flash_sale_end)
        .bind(product.created_at)
        .bind(product.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM products WHERE TRUE");
        if let Some(category) = &query.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(search) = &query.search {
            qb.push(" AND name ILIKE ")
                .push_bind(format!("%{}%", escape_like(search)));
        }
        qb.push(match query.sort {
            ProductSort::Newest => " ORDER BY created_at DESC",
            ProductSort::Oldest => " ORDER BY created_at ASC",
            ProductSort::PriceLow => " ORDER BY price ASC",
            ProductSort::PriceHigh => " ORDER BY price DESC",
            ProductSort::Bestseller => " ORDER BY sold DESC",
        });
        Ok(qb.build_query_as::<Product>().fetch_all(&self.pool).await?)
    }

    async fn products_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as(
            "SELECT * FROM products WHERE seller_id = $1 ORDER BY created_at DESC",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        sqlx::query_as::<_, Product>(
            r#"UPDATE products SET name = $2, description = $3, price = $4, category = $5,
                   image = $6, delivery_type = $7, delivery_content = $8, updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(&product.image)
        .bind(product.delivery_type.as_str())
        .bind(&product.delivery_content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("product"))
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_flash_sale(
        &self,
        id: Uuid,
        price: i64,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        sqlx::query_as::<_, Product>(
            r#"UPDATE products SET flash_sale_price = $2, flash_sale_end = $3, updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(price)
        .bind(ends_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("product"))
    }

    async fn add_review(&self, review: Review) -> StoreResult<Product> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO reviews (id, product_id, user_id, rating, comment, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(review.id)
        .bind(review.product_id)
        .bind(review.user_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(tx.as_mut())
        .await
        .map_err(map_unique)?;
        let product: Option<Product> = sqlx::query_as(
            r#"UPDATE products SET average_rating =
                   (SELECT AVG(rating)::DOUBLE PRECISION FROM reviews WHERE product_id = $1)
               WHERE id = $1 RETURNING *"#,
        )
        .bind(review.product_id)
        .fetch_optional(tx.as_mut())
        .await?;
        let product = product.ok_or(StoreError::NotFound("product"))?;
        tx.commit().await?;
        Ok(product)
    }

    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        Ok(sqlx::query_as(
            "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn settle_purchase(&self, purchase: Purchase) -> StoreResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let debited: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE users SET balance = balance - $2, monthly_spend = monthly_spend + $2,
                   updated_at = now()
               WHERE id = $1 AND balance >= $2 RETURNING balance"#,
        )
        .bind(purchase.buyer_id)
        .bind(purchase.price)
        .fetch_optional(tx.as_mut())
        .await?;
        let Some((balance,)) = debited else {
            tx.rollback().await?;
            return Ok(None);
        };

        credit_in_tx(&mut tx, purchase.seller_id, purchase.price).await?;

        let sold = sqlx::query("UPDATE products SET sold = sold + 1 WHERE id = $1")
            .bind(purchase.product_id)
            .execute(tx.as_mut())
            .await?;
        if sold.rows_affected() == 0 {
            return Err(StoreError::NotFound("product"));
        }

        sqlx::query(
            r#"INSERT INTO purchases (id, buyer_id, product_id, seller_id, price,
                   delivery_content, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(purchase.id)
        .bind(purchase.buyer_id)
        .bind(purchase.product_id)
        .bind(purchase.seller_id)
        .bind(purchase.price)
        .bind(&purchase.delivery_content)
        .bind(&purchase.status)
        .bind(purchase.created_at)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn has_purchased(&self, buyer_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM purchases WHERE buyer_id = $1 AND product_id = $2 LIMIT 1",
        )
        .bind(buyer_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn purchases_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Purchase>> {
        Ok(sqlx::query_as(
            "SELECT * FROM purchases WHERE buyer_id = $1 ORDER BY created_at DESC",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_voucher(&self, voucher: Voucher) -> StoreResult<Voucher> {
        sqlx::query_as::<_, Voucher>(
            r#"INSERT INTO vouchers (id, code, kind, value, min_purchase, max_discount, quota,
                   used_by, expires_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING *"#,
        )
        .bind(voucher.id)
        .bind(&voucher.code)
        .bind(voucher.kind.as_str())
        .bind(voucher.value)
        .bind(voucher.min_purchase)
        .bind(voucher.max_discount)
        .bind(voucher.quota)
        .bind(&voucher.used_by)
        .bind(voucher.expires_at)
        .bind(voucher.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn list_vouchers(&self) -> StoreResult<Vec<Voucher>> {
        Ok(sqlx::query_as("SELECT * FROM vouchers ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn voucher_by_code(
        &self,
        code: &str,
        kind: VoucherKind,
    ) -> StoreResult<Option<Voucher>> {
        Ok(
            sqlx::query_as("SELECT * FROM vouchers WHERE code = $1 AND kind = $2")
                .bind(code)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn claim_voucher(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"UPDATE vouchers SET quota = quota - 1, used_by = array_append(used_by, $2)
               WHERE id = $1 AND quota > 0 AND expires_at > $3 AND NOT ($2 = ANY(used_by))"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn release_voucher(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE vouchers SET quota = quota + 1, used_by = array_remove(used_by, $2)
               WHERE id = $1 AND $2 = ANY(used_by)"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn redeem_balance_voucher(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE vouchers SET quota = quota - 1, used_by = array_append(used_by, $2)
               WHERE id = $1 AND kind = 'balance' AND quota > 0 AND expires_at > $3
                   AND NOT ($2 = ANY(used_by))
               RETURNING value"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(tx.as_mut())
        .await?;
        let Some((value,)) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };
        let balance = credit_in_tx(&mut tx, user_id, value).await?;
        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn create_smm_order(&self, order: SmmOrder) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO smm_orders (id, user_id, provider_order_id, service_id, service_name,
                   target_link, quantity, price, start_count, remains, status, refunded,
                   created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.provider_order_id)
        .bind(&order.service_id)
        .bind(&order.service_name)
        .bind(&order.target_link)
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.start_count)
        .bind(order.remains)
        .bind(&order.status)
        .bind(order.refunded)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn smm_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SmmOrder>> {
        Ok(sqlx::query_as(
            "SELECT * FROM smm_orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_smm_progress(
        &self,
        id: Uuid,
        status: &str,
        start_count: i64,
        remains: i64,
    ) -> StoreResult<()> {
        let res = sqlx::query(
            r#"UPDATE smm_orders SET status = $2, start_count = $3, remains = $4,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(start_count)
        .bind(remains)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("smm order"));
        }
        Ok(())
    }

    async fn create_ppob_order(&self, order: PpobOrder) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO ppob_orders (id, user_id, provider_order_id, service_code,
                   product_name, target_number, price, sn, note, status, refunded,
                   created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.provider_order_id)
        .bind(&order.service_code)
        .bind(&order.product_name)
        .bind(&order.target_number)
        .bind(order.price)
        .bind(&order.sn)
        .bind(&order.note)
        .bind(&order.status)
        .bind(order.refunded)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ppob_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<PpobOrder>> {
        Ok(sqlx::query_as(
            "SELECT * FROM ppob_orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_ppob_progress(
        &self,
        id: Uuid,
        status: &str,
        sn: Option<&str>,
    ) -> StoreResult<()> {
        let res = sqlx::query(
            r#"UPDATE ppob_orders SET status = $2, sn = COALESCE($3, sn), updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(sn)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("ppob order"));
        }
        Ok(())
    }

    async fn create_nokos_order(&self, order: NokosOrder) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO nokos_orders (id, user_id, order_id, provider_id, service_name,
                   country_name, phone_number, price, status, otp_code, refunded, expires_at,
                   created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.order_id)
        .bind(&order.provider_id)
        .bind(&order.service_name)
        .bind(&order.country_name)
        .bind(&order.phone_number)
        .bind(order.price)
        .bind(&order.status)
        .bind(&order.otp_code)
        .bind(order.refunded)
        .bind(order.expires_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(())
    }

    async fn nokos_order(&self, order_id: &str) -> StoreResult<Option<NokosOrder>> {
        Ok(sqlx::query_as("SELECT * FROM nokos_orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn nokos_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<NokosOrder>> {
        Ok(sqlx::query_as(
            "SELECT * FROM nokos_orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_nokos_status(
        &self,
        id: Uuid,
        status: &str,
        otp_code: &str,
    ) -> StoreResult<()> {
        let res = sqlx::query(
            r#"UPDATE nokos_orders SET status = $2, otp_code = $3, updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(otp_code)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("nokos order"));
        }
        Ok(())
    }

    async fn refund_order(&self, kind: OrderKind, id: Uuid) -> StoreResult<Option<i64>> {
        let (table, what) = match kind {
            OrderKind::Smm => ("smm_orders", "smm order"),
            OrderKind::Ppob => ("ppob_orders", "ppob order"),
            OrderKind::Nokos => ("nokos_orders", "nokos order"),
        };
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid, i64, bool)> = sqlx::query_as(&format!(
            "SELECT user_id, price, refunded FROM {table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(tx.as_mut())
        .await?;
        let (owner, price, refunded) = locked.ok_or(StoreError::NotFound(what))?;
        if refunded {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(&format!(
            "UPDATE {table} SET refunded = TRUE, updated_at = now() WHERE id = $1"
        ))
        .bind(id)
        .execute(tx.as_mut())
        .await?;
        credit_in_tx(&mut tx, owner, price).await?;

        tx.commit().await?;
        Ok(Some(price))
    }

    async fn order_stats(&self) -> StoreResult<OrderStats> {
        let (smm_orders, ppob_orders, revenue): (i64, i64, i64) = sqlx::query_as(
            r#"SELECT
                   (SELECT COUNT(*) FROM smm_orders),
                   (SELECT COUNT(*) FROM ppob_orders),
                   ((SELECT COALESCE(SUM(price), 0) FROM smm_orders WHERE status = 'Success')
                    + (SELECT COALESCE(SUM(price), 0) FROM ppob_orders WHERE status = 'Success'))
                   ::BIGINT"#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(OrderStats {
            smm_orders,
            ppob_orders,
            revenue,
        })
    }

    async fn order_counts_for_user(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        Ok(sqlx::query_as(
            r#"SELECT
                   (SELECT COUNT(*) FROM smm_orders WHERE user_id = $1),
                   (SELECT COUNT(*) FROM ppob_orders WHERE user_id = $1)"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn send_message(&self, message: ChatMessage) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO chat_messages (id, sender_id, receiver_id, message, is_read, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.message)
        .bind(message.is_read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatMessage>> {
        Ok(sqlx::query_as(
            r#"SELECT * FROM chat_messages WHERE sender_id = $1 OR receiver_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn conversation(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<ChatMessage>> {
        Ok(sqlx::query_as(
            r#"SELECT * FROM chat_messages
               WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
               ORDER BY created_at ASC"#,
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"UPDATE chat_messages SET is_read = TRUE
               WHERE sender_id = $1 AND receiver_id = $2 AND NOT is_read"#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn create_news(&self, news: News) -> StoreResult<News> {
        sqlx::query_as::<_, News>(
            r#"INSERT INTO news (id, title, slug, content, image, author, category, audience,
                   created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING *"#,
        )
        .bind(news.id)
        .bind(&news.title)
        .bind(&news.slug)
        .bind(&news.content)
        .bind(&news.image)
        .bind(&news.author)
        .bind(news.category.as_str())
        .bind(news.audience.as_str())
        .bind(news.created_at)
        .bind(news.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn update_news(&self, news: &News) -> StoreResult<News> {
        sqlx::query_as::<_, News>(
            r#"UPDATE news SET title = $2, content = $3, image = $4, category = $5,
                   audience = $6, updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(news.id)
        .bind(&news.title)
        .bind(&news.content)
        .bind(&news.image)
        .bind(news.category.as_str())
        .bind(news.audience.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("news"))
    }

    async fn delete_news(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM news WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn news(&self, id: Uuid) -> StoreResult<Option<News>> {
        Ok(sqlx::query_as("SELECT * FROM news WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn news_by_slug(&self, slug: &str) -> StoreResult<Option<News>> {
        Ok(sqlx::query_as("SELECT * FROM news WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_news(&self, limit: Option<i64>) -> StoreResult<Vec<News>> {
        Ok(
            sqlx::query_as("SELECT * FROM news ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn settings(&self) -> StoreResult<Option<SiteSettings>> {
        Ok(sqlx::query_as("SELECT * FROM site_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_settings(&self, settings: &SiteSettings) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO site_settings (id, website_title, website_logo, website_favicon,
                   is_maintenance, maintenance_message)
               VALUES (1, $1, $2, $3, $4, $5)
               ON CONFLICT (id) DO UPDATE SET website_title = EXCLUDED.website_title,
                   website_logo = EXCLUDED.website_logo,
                   website_favicon = EXCLUDED.website_favicon,
                   is_maintenance = EXCLUDED.is_maintenance,
                   maintenance_message = EXCLUDED.maintenance_message"#,
        )
        .bind(&settings.website_title)
        .bind(&settings.website_logo)
        .bind(&settings.website_favicon)
        .bind(settings.is_maintenance)
        .bind(&settings.maintenance_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }
}
