use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    AdminUserUpdate, OrderStats, ProductQuery, ProductSort, SettledDeposit, Store, StoreError,
    StoreResult,
};
use crate::pricing::{REFERRAL_COMMISSION_PERCENTAGE, percent_of, rank_for_total_deposit};
use crate::types::{
    ChatMessage, Deposit, DepositStatus, News, NokosOrder, OrderKind, PpobOrder, Product,
    Purchase, Review, SiteSettings, SmmOrder, User, Voucher, VoucherKind,
};

/// A [`Store`] held entirely in process memory.
///
/// Every method runs under one lock, which makes each multi-record
/// operation atomic. Used by the test-suite and for local runs without a
/// database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    deposits: Vec<Deposit>,
    products: Vec<Product>,
    reviews: Vec<Review>,
    purchases: Vec<Purchase>,
    vouchers: Vec<Voucher>,
    smm_orders: Vec<SmmOrder>,
    ppob_orders: Vec<PpobOrder>,
    nokos_orders: Vec<NokosOrder>,
    messages: Vec<ChatMessage>,
    news: Vec<News>,
    settings: Option<SiteSettings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn user_mut(&mut self, id: Uuid) -> StoreResult<&mut User> {
        self.users.get_mut(&id).ok_or(StoreError::NotFound("user"))
    }

    fn product_mut(&mut self, id: Uuid) -> StoreResult<&mut Product> {
        self.products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound("product"))
    }

    fn credit(&mut self, id: Uuid, amount: i64) -> StoreResult<i64> {
        let user = self.user_mut(id)?;
        user.balance += amount;
        user.updated_at = Utc::now();
        Ok(user.balance)
    }
}

fn newest_first<T, F: Fn(&T) -> DateTime<Utc>>(mut items: Vec<T>, key: F) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        for existing in inner.users.values() {
            if existing.username == user.username {
                return Err(StoreError::Conflict("username".into()));
            }
            if existing.email == user.email {
                return Err(StoreError::Conflict("email".into()));
            }
            if existing.referral_code == user.referral_code {
                return Err(StoreError::Conflict("referral code".into()));
            }
        }
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|u| u.referral_code == code)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = self.inner.lock().users.values().cloned().collect();
        Ok(newest_first(users, |u: &User| u.created_at))
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.inner.lock().users.len() as i64)
    }

    async fn top_users_by_balance(&self, limit: i64) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.inner.lock().users.values().cloned().collect();
        users.sort_by(|a, b| b.balance.cmp(&a.balance));
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        fullname: &str,
        username: &str,
        profile_pic: Option<&str>,
    ) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        if inner
            .users
            .values()
            .any(|u| u.id != id && u.username == username)
        {
            return Err(StoreError::Conflict("username".into()));
        }
        let user = inner.user_mut(id)?;
        user.fullname = fullname.to_string();
        user.username = username.to_string();
        if let Some(pic) = profile_pic {
            user.profile_pic = pic.to_string();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_verification_code(&self, id: Uuid, code: Option<&str>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.user_mut(id)?.verification_code = code.map(str::to_string);
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let user = inner.user_mut(id)?;
        user.is_verified = true;
        user.verification_code = None;
        Ok(())
    }

    async fn set_two_factor(
        &self,
        id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let user = inner.user_mut(id)?;
        user.two_factor_secret = secret.map(str::to_string);
        user.two_factor_enabled = enabled;
        Ok(())
    }

    async fn admin_update_user(&self, id: Uuid, update: AdminUserUpdate) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        let user = inner.user_mut(id)?;
        user.balance = update.balance;
        user.role = update.role;
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        let user = inner.user_mut(id)?;
        if user.balance < amount {
            return Ok(None);
        }
        user.balance -= amount;
        user.updated_at = Utc::now();
        Ok(Some(user.balance))
    }

    async fn record_spend(&self, id: Uuid, amount: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.user_mut(id)?.monthly_spend += amount;
        Ok(())
    }

    async fn credit(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        self.inner.lock().credit(id, amount)
    }

    async fn claim_daily_bonus(
        &self,
        id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        let user = inner.user_mut(id)?;
        if user.last_daily_claim.is_some_and(|last| now - last < cooldown) {
            return Ok(None);
        }
        user.balance += amount;
        user.last_daily_claim = Some(now);
        Ok(Some(user.balance))
    }

    async fn create_deposit(&self, deposit: Deposit) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.deposits.iter().any(|d| d.order_id == deposit.order_id) {
            return Err(StoreError::Conflict("deposit order id".into()));
        }
        inner.deposits.push(deposit);
        Ok(())
    }

    async fn deposit_by_order_id(&self, order_id: &str) -> StoreResult<Option<Deposit>> {
        Ok(self
            .inner
            .lock()
            .deposits
            .iter()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn deposits_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Deposit>> {
        let deposits = self
            .inner
            .lock()
            .deposits
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(deposits, |d: &Deposit| d.created_at))
    }

    async fn settle_deposit(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Option<SettledDeposit>> {
        let mut inner = self.inner.lock();
        let deposit = inner
            .deposits
            .iter_mut()
            .find(|d| d.order_id == order_id)
            .ok_or(StoreError::NotFound("deposit"))?;
        if deposit.status == DepositStatus::Success {
            return Ok(None);
        }
        deposit.status = DepositStatus::Success;
        deposit.payment_type = payment_type.map(str::to_string);
        deposit.payment_time = Some(paid_at);
        let deposit = deposit.clone();

        let user = inner.user_mut(deposit.user_id)?;
        user.balance += deposit.amount;
        user.total_deposit += deposit.amount;
        user.rank = rank_for_total_deposit(user.total_deposit);
        user.updated_at = paid_at;
        let user = user.clone();

        let mut commission = None;
        if let Some(code) = user.referred_by.as_deref() {
            let amount = percent_of(deposit.amount, REFERRAL_COMMISSION_PERCENTAGE);
            if let Some(upline) = inner
                .users
                .values_mut()
                .find(|u| u.referral_code == code && u.id != user.id)
            {
                upline.balance += amount;
                upline.referral_earnings += amount;
                commission = Some((upline.id, amount));
            }
        }

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
        let mut inner = self.inner.lock();
        let Some(deposit) = inner
            .deposits
            .iter_mut()
            .find(|d| d.order_id == order_id && d.status == DepositStatus::Pending)
        else {
            return Ok(None);
        };
        deposit.status = DepositStatus::Failed;
        deposit.payment_type = payment_type.map(str::to_string);
        deposit.payment_time = Some(at);
        Ok(Some(deposit.clone()))
    }

    async fn record_payment_type(
        &self,
        order_id: &str,
        payment_type: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(deposit) = inner.deposits.iter_mut().find(|d| d.order_id == order_id) {
            deposit.payment_type = payment_type.map(str::to_string);
        }
        Ok(())
    }

    async fn create_product(&self, product: Product) -> StoreResult<Product> {
        let mut inner = self.inner.lock();
        if inner.products.iter().any(|p| p.slug == product.slug) {
            return Err(StoreError::Conflict("product slug".into()));
        }
        inner.products.push(product.clone());
        Ok(product)
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self
            .inner
            .lock()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .inner
            .lock()
            .products
            .iter()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>> {
        let search = query.search.as_ref().map(|s| s.to_lowercase());
        let mut products: Vec<Product> = self
            .inner
            .lock()
            .products
            .iter()
            .filter(|p| query.category.as_ref().is_none_or(|c| &p.category == c))
            .filter(|p| {
                search
                    .as_ref()
                    .is_none_or(|s| p.name.to_lowercase().contains(s))
            })
            .cloned()
            .collect();
        match query.sort {
            ProductSort::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::Oldest => products.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            ProductSort::PriceLow => products.sort_by(|a, b| a.price.cmp(&b.price)),
            ProductSort::PriceHigh => products.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::Bestseller => products.sort_by(|a, b| b.sold.cmp(&a.sold)),
        }
        Ok(products)
    }

    async fn products_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Product>> {
        let products = self
            .inner
            .lock()
            .products
            .iter()
            .filter(|p| p.seller_id == seller_id)
            .cloned()
            .collect();
        Ok(newest_first(products, |p: &Product| p.created_at))
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        let mut inner = self.inner.lock();
        let stored = inner.product_mut(product.id)?;
        stored.name = product.name.clone();
        stored.description = product.description.clone();
        stored.price = product.price;
        stored.category = product.category.clone();
        stored.image = product.image.clone();
        stored.delivery_type = product.delivery_type;
        stored.delivery_content = product.delivery_content.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let before = inner.products.len();
        inner.products.retain(|p| p.id != id);
        inner.reviews.retain(|r| r.product_id != id);
        Ok(inner.products.len() != before)
    }

    async fn set_flash_sale(
        &self,
        id: Uuid,
        price: i64,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        let mut inner = self.inner.lock();
        let product = inner.product_mut(id)?;
        product.flash_sale_price = price;
        product.flash_sale_end = Some(ends_at);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn add_review(&self, review: Review) -> StoreResult<Product> {
        let mut inner = self.inner.lock();
        if inner
            .reviews
            .iter()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(StoreError::Conflict("review".into()));
        }
        let product_id = review.product_id;
        inner.product_mut(product_id)?;
        inner.reviews.push(review);
        let ratings: Vec<i32> = inner
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        let average = ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64;
        let product = inner.product_mut(product_id)?;
        product.average_rating = average;
        Ok(product.clone())
    }

    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let reviews = self
            .inner
            .lock()
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        Ok(newest_first(reviews, |r: &Review| r.created_at))
    }

    async fn settle_purchase(&self, purchase: Purchase) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        inner.user_mut(purchase.seller_id)?;
        inner.product_mut(purchase.product_id)?;
        let buyer = inner.user_mut(purchase.buyer_id)?;
        if buyer.balance < purchase.price {
            return Ok(None);
        }
        buyer.balance -= purchase.price;
        buyer.monthly_spend += purchase.price;
        let balance = buyer.balance;
        inner.credit(purchase.seller_id, purchase.price)?;
        inner.product_mut(purchase.product_id)?.sold += 1;
        inner.purchases.push(purchase);
        Ok(Some(balance))
    }

    async fn has_purchased(&self, buyer_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .inner
            .lock()
            .purchases
            .iter()
            .any(|p| p.buyer_id == buyer_id && p.product_id == product_id))
    }

    async fn purchases_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Purchase>> {
        let purchases = self
            .inner
            .lock()
            .purchases
            .iter()
            .filter(|p| p.buyer_id == buyer_id)
            .cloned()
            .collect();
        Ok(newest_first(purchases, |p: &Purchase| p.created_at))
    }

    async fn create_voucher(&self, voucher: Voucher) -> StoreResult<Voucher> {
        let mut inner = self.inner.lock();
        if inner.vouchers.iter().any(|v| v.code == voucher.code) {
            return Err(StoreError::Conflict("voucher code".into()));
        }
        inner.vouchers.push(voucher.clone());
        Ok(voucher)
    }

    async fn list_vouchers(&self) -> StoreResult<Vec<Voucher>> {
        let vouchers = self.inner.lock().vouchers.clone();
        Ok(newest_first(vouchers, |v: &Voucher| v.created_at))
    }

    async fn voucher_by_code(
        &self,
        code: &str,
        kind: VoucherKind,
    ) -> StoreResult<Option<Voucher>> {
        Ok(self
            .inner
            .lock()
            .vouchers
            .iter()
            .find(|v| v.code == code && v.kind == kind)
            .cloned())
    }

    async fn claim_voucher(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(voucher) = inner.vouchers.iter_mut().find(|v| v.id == id) else {
            return Ok(false);
        };
        if !voucher.claimable_by(user_id, now) {
            return Ok(false);
        }
        voucher.quota -= 1;
        voucher.used_by.push(user_id);
        Ok(true)
    }

    async fn release_voucher(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(voucher) = inner.vouchers.iter_mut().find(|v| v.id == id) {
            if let Some(pos) = voucher.used_by.iter().position(|u| *u == user_id) {
                voucher.used_by.remove(pos);
                voucher.quota += 1;
            }
        }
        Ok(())
    }

    async fn redeem_balance_voucher(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        inner.user_mut(user_id)?;
        let Some(voucher) = inner
            .vouchers
            .iter_mut()
            .find(|v| v.id == id && v.kind == VoucherKind::Balance)
        else {
            return Ok(None);
        };
        if !voucher.claimable_by(user_id, now) {
            return Ok(None);
        }
        voucher.quota -= 1;
        voucher.used_by.push(user_id);
        let value = voucher.value;
        inner.credit(user_id, value).map(Some)
    }

    async fn create_smm_order(&self, order: SmmOrder) -> StoreResult<()> {
        self.inner.lock().smm_orders.push(order);
        Ok(())
    }

    async fn smm_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SmmOrder>> {
        let orders = self
            .inner
            .lock()
            .smm_orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &SmmOrder| o.created_at))
    }

    async fn update_smm_progress(
        &self,
        id: Uuid,
        status: &str,
        start_count: i64,
        remains: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let order = inner
            .smm_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::NotFound("smm order"))?;
        order.status = status.to_string();
        order.start_count = start_count;
        order.remains = remains;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn create_ppob_order(&self, order: PpobOrder) -> StoreResult<()> {
        self.inner.lock().ppob_orders.push(order);
        Ok(())
    }

    async fn ppob_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<PpobOrder>> {
        let orders = self
            .inner
            .lock()
            .ppob_orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &PpobOrder| o.created_at))
    }

    async fn update_ppob_progress(
        &self,
        id: Uuid,
        status: &str,
        sn: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let order = inner
            .ppob_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::NotFound("ppob order"))?;
        order.status = status.to_string();
        if let Some(sn) = sn {
            order.sn = sn.to_string();
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn create_nokos_order(&self, order: NokosOrder) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.nokos_orders.iter().any(|o| o.order_id == order.order_id) {
            return Err(StoreError::Conflict("number order id".into()));
        }
        inner.nokos_orders.push(order);
        Ok(())
    }

    async fn nokos_order(&self, order_id: &str) -> StoreResult<Option<NokosOrder>> {
        Ok(self
            .inner
            .lock()
            .nokos_orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned())
    }

    async fn nokos_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<NokosOrder>> {
        let orders = self
            .inner
            .lock()
            .nokos_orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &NokosOrder| o.created_at))
    }

    async fn update_nokos_status(
        &self,
        id: Uuid,
        status: &str,
        otp_code: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let order = inner
            .nokos_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::NotFound("nokos order"))?;
        order.status = status.to_string();
        order.otp_code = otp_code.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn refund_order(&self, kind: OrderKind, id: Uuid) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock();
        let (owner, price) = match kind {
            OrderKind::Smm => {
                let order = inner
                    .smm_orders
                    .iter_mut()
                    .find(|o| o.id == id)
                    .ok_or(StoreError::NotFound("smm order"))?;
                if order.refunded {
                    return Ok(None);
                }
                order.refunded = true;
                (order.user_id, order.price)
            }
            OrderKind::Ppob => {
                let order = inner
                    .ppob_orders
                    .iter_mut()
                    .find(|o| o.id == id)
                    .ok_or(StoreError::NotFound("ppob order"))?;
                if order.refunded {
                    return Ok(None);
                }
                order.refunded = true;
                (order.user_id, order.price)
            }
            OrderKind::Nokos => {
                let order = inner
                    .nokos_orders
                    .iter_mut()
                    .find(|o| o.id == id)
                    .ok_or(StoreError::NotFound("nokos order"))?;
                if order.refunded {
                    return Ok(None);
                }
                order.refunded = true;
                (order.user_id, order.price)
            }
        };
        inner.credit(owner, price)?;
        Ok(Some(price))
    }

    async fn order_stats(&self) -> StoreResult<OrderStats> {
        let inner = self.inner.lock();
        let revenue = inner
            .smm_orders
            .iter()
            .filter(|o| o.status == "Success")
            .map(|o| o.price)
            .sum::<i64>()
            + inner
                .ppob_orders
                .iter()
                .filter(|o| o.status == "Success")
                .map(|o| o.price)
                .sum::<i64>();
        Ok(OrderStats {
            smm_orders: inner.smm_orders.len() as i64,
            ppob_orders: inner.ppob_orders.len() as i64,
            revenue,
        })
    }

    async fn order_counts_for_user(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        let inner = self.inner.lock();
        let smm = inner.smm_orders.iter().filter(|o| o.user_id == user_id).count();
        let ppob = inner.ppob_orders.iter().filter(|o| o.user_id == user_id).count();
        Ok((smm as i64, ppob as i64))
    }

    async fn send_message(&self, message: ChatMessage) -> StoreResult<()> {
        self.inner.lock().messages.push(message);
        Ok(())
    }

    async fn messages_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatMessage>> {
        // Stable sort keeps insertion order for equal timestamps, so reverse
        // first to put later sends ahead.
        let mut messages: Vec<ChatMessage> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .cloned()
            .collect();
        messages.reverse();
        Ok(newest_first(messages, |m: &ChatMessage| m.created_at))
    }

    async fn conversation(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let mut marked = 0;
        for m in inner
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == sender_id && m.receiver_id == receiver_id && !m.is_read)
        {
            m.is_read = true;
            marked += 1;
        }
        Ok(marked)
    }

    async fn create_news(&self, news: News) -> StoreResult<News> {
        let mut inner = self.inner.lock();
        if inner.news.iter().any(|n| n.slug == news.slug) {
            return Err(StoreError::Conflict("news slug".into()));
        }
        inner.news.push(news.clone());
        Ok(news)
    }

    async fn update_news(&self, news: &News) -> StoreResult<News> {
        let mut inner = self.inner.lock();
        let stored = inner
            .news
            .iter_mut()
            .find(|n| n.id == news.id)
            .ok_or(StoreError::NotFound("news"))?;
        stored.title = news.title.clone();
        stored.content = news.content.clone();
        stored.image = news.image.clone();
        stored.category = news.category;
        stored.audience = news.audience;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_news(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let before = inner.news.len();
        inner.news.retain(|n| n.id != id);
        Ok(inner.news.len() != before)
    }

    async fn news(&self, id: Uuid) -> StoreResult<Option<News>> {
        Ok(self.inner.lock().news.iter().find(|n| n.id == id).cloned())
    }

    async fn news_by_slug(&self, slug: &str) -> StoreResult<Option<News>> {
        Ok(self
            .inner
            .lock()
            .news
            .iter()
            .find(|n| n.slug == slug)
            .cloned())
    }

    async fn list_news(&self, limit: Option<i64>) -> StoreResult<Vec<News>> {
        let mut news = newest_first(self.inner.lock().news.clone(), |n: &News| n.created_at);
        if let Some(limit) = limit {
            news.truncate(limit.max(0) as usize);
        }
        Ok(news)
    }

    async fn settings(&self) -> StoreResult<Option<SiteSettings>> {
        Ok(self.inner.lock().settings.clone())
    }

    async fn save_settings(&self, settings: &SiteSettings) -> StoreResult<()> {
        self.inner.lock().settings = Some(settings.clone());
        Ok(())
    }
}
