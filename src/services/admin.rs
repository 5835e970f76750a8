use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::load_user;
use crate::auth::password::hash_password;
use crate::error::{ShopError, ShopResult};
use crate::mailer::Email;
use crate::state::AppState;
use crate::store::{AdminUserUpdate, ProductQuery};
use crate::types::{Product, Role, SiteSettings, User, Voucher, VoucherKind};

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub users: i64,
    pub smm_orders: i64,
    pub ppob_orders: i64,
    /// SMM vendor balance; zero when the vendor could not be reached.
    pub provider_balance: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEdit {
    pub balance: i64,
    pub role: Role,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Broadcast {
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoucherInput {
    pub code: String,
    pub kind: VoucherKind,
    pub value: i64,
    #[serde(default)]
    pub min_purchase: i64,
    #[serde(default)]
    pub max_discount: i64,
    pub quota: i64,
    pub expires_in_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlashSaleInput {
    pub product_id: Uuid,
    pub price: i64,
    pub duration_hours: i64,
}

pub async fn stats(state: &AppState) -> ShopResult<Stats> {
    let orders = state.store.order_stats().await?;
    let provider_balance = match state.smm.balance().await {
        Ok(balance) => balance,
        Err(e) => {
            warn!(error = %e, "could not read provider balance");
            0
        }
    };
    Ok(Stats {
        users: state.store.count_users().await?,
        smm_orders: orders.smm_orders,
        ppob_orders: orders.ppob_orders,
        provider_balance,
        revenue: orders.revenue,
    })
}

pub async fn users(state: &AppState) -> ShopResult<Vec<User>> {
    Ok(state.store.list_users().await?)
}

pub async fn user(state: &AppState, id: Uuid) -> ShopResult<User> {
    load_user(state, id).await
}

pub async fn update_user(
    state: &AppState,
    admin: &User,
    id: Uuid,
    edit: UserEdit,
) -> ShopResult<User> {
    if edit.balance < 0 {
        return Err(ShopError::InvalidInput("balance cannot be negative".to_string()));
    }
    if id == admin.id && edit.role != Role::Admin {
        return Err(ShopError::Forbidden(
            "administrators cannot demote themselves".to_string(),
        ));
    }
    let password_hash = match edit.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password, state.config.bcrypt_cost)?),
        None => None,
    };
    let user = state
        .store
        .admin_update_user(
            id,
            AdminUserUpdate {
                balance: edit.balance,
                role: edit.role,
                password_hash,
            },
        )
        .await?;
    info!(admin = %admin.id, user_id = %id, role = %user.role, balance = user.balance, "account edited");
    Ok(user)
}

pub async fn settings(state: &AppState) -> SiteSettings {
    super::site::settings(state).await
}

pub async fn update_settings(state: &AppState, settings: SiteSettings) -> ShopResult<SiteSettings> {
    if settings.website_title.trim().is_empty() {
        return Err(ShopError::InvalidInput("website title is required".to_string()));
    }
    state.store.save_settings(&settings).await?;
    info!(maintenance = settings.is_maintenance, "site settings saved");
    Ok(settings)
}

/// Queues `broadcast` for every account and returns how many were queued.
/// Delivery happens in the background.
pub async fn broadcast(state: &AppState, broadcast: Broadcast) -> ShopResult<usize> {
    if broadcast.subject.trim().is_empty() || broadcast.message.trim().is_empty() {
        return Err(ShopError::InvalidInput(
            "subject and message are required".to_string(),
        ));
    }
    let recipients: Vec<String> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| u.email)
        .collect();
    let count = recipients.len();
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        let mut failed = 0usize;
        for to in recipients {
            let email = Email {
                to,
                subject: broadcast.subject.clone(),
                html: broadcast.message.clone(),
            };
            if let Err(e) = mailer.send(email).await {
                failed += 1;
                warn!(error = %e, "broadcast delivery failed");
            }
        }
        info!(sent = count - failed, failed, "broadcast finished");
    });
    Ok(count)
}

pub async fn vouchers(state: &AppState) -> ShopResult<Vec<Voucher>> {
    Ok(state.store.list_vouchers().await?)
}

pub async fn create_voucher(
    state: &AppState,
    input: VoucherInput,
    now: DateTime<Utc>,
) -> ShopResult<Voucher> {
    let code = input.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ShopError::InvalidInput("code is required".to_string()));
    }
    if input.value <= 0 || input.quota <= 0 || input.expires_in_days <= 0 {
        return Err(ShopError::InvalidInput(
            "value, quota and expiry must be positive".to_string(),
        ));
    }
    if input.kind == VoucherKind::Discount && input.value > 100 {
        return Err(ShopError::InvalidInput(
            "discount cannot exceed 100 percent".to_string(),
        ));
    }
    let voucher = Voucher {
        id: Uuid::new_v4(),
        code,
        kind: input.kind,
        value: input.value,
        min_purchase: input.min_purchase.max(0),
        max_discount: input.max_discount.max(0),
        quota: input.quota,
        used_by: Vec::new(),
        expires_at: now + Duration::days(input.expires_in_days),
        created_at: now,
    };
    let voucher = state.store.create_voucher(voucher).await?;
    info!(code = %voucher.code, kind = %voucher.kind, "voucher created");
    Ok(voucher)
}

pub async fn flash_sales(state: &AppState) -> ShopResult<Vec<Product>> {
    Ok(state.store.list_products(&ProductQuery::default()).await?)
}

pub async fn set_flash_sale(
    state: &AppState,
    input: FlashSaleInput,
    now: DateTime<Utc>,
) -> ShopResult<Product> {
    if input.price < 0 || input.duration_hours <= 0 {
        return Err(ShopError::InvalidInput(
            "price and duration must be positive".to_string(),
        ));
    }
    let ends_at = now + Duration::hours(input.duration_hours);
    let product = state
        .store
        .set_flash_sale(input.product_id, input.price, ends_at)
        .await?;
    info!(product_id = %product.id, price = input.price, %ends_at, "flash sale set");
    Ok(product)
}
