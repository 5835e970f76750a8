//! Business operations. Every function takes the shared [`AppState`] and
//! returns a [`ShopResult`]; HTTP concerns stay in `api`.
//!
//! [`AppState`]: crate::state::AppState
//! [`ShopResult`]: crate::error::ShopResult

pub mod accounts;
pub mod admin;
pub mod bonus;
pub mod chat;
pub mod deposits;
pub mod marketplace;
pub mod news;
pub mod nokos;
pub mod ppob;
pub mod site;
pub mod smm;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{ShopError, ShopResult};
use crate::providers::ProviderError;
use crate::state::AppState;
use crate::types::User;

pub(crate) async fn load_user(state: &AppState, id: Uuid) -> ShopResult<User> {
    state
        .store
        .user(id)
        .await?
        .ok_or(ShopError::NotFound("user"))
}

/// Lowercase ASCII words joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}

/// `slugify(text)` made unique with the creation time.
pub(crate) fn timestamped_slug(text: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", slugify(text), now.timestamp_millis())
}

/// Provider statuses after which the order's price goes back to the user.
pub(crate) fn is_failed_order_status(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "canceled" | "cancelled" | "error" | "failed"
    )
}

/// Debits `price` ahead of a provider call.
pub(crate) async fn reserve(state: &AppState, user: &User, price: i64) -> ShopResult<i64> {
    state
        .store
        .debit(user.id, price)
        .await?
        .ok_or(ShopError::InsufficientBalance {
            required: price,
            available: user.balance,
        })
}

/// Credits back a reservation after the provider refused the order, then
/// hands the provider's error on.
pub(crate) async fn release(
    state: &AppState,
    user_id: Uuid,
    price: i64,
    cause: ProviderError,
) -> ShopError {
    match state.store.credit(user_id, price).await {
        Ok(balance) => {
            info!(%user_id, price, balance, "reservation returned after provider failure");
            ShopError::Provider(cause)
        }
        Err(e) => {
            error!(%user_id, price, error = %e, "failed to return reservation");
            ShopError::Store(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("Netflix Premium 1 Bulan!"), "netflix-premium-1-bulan");
        assert_eq!(slugify("  --Ebook  & Course--  "), "ebook-course");
        assert_eq!(slugify("???"), "item");
    }

    #[test]
    fn failure_statuses_ignore_case() {
        assert!(is_failed_order_status("Canceled"));
        assert!(is_failed_order_status("ERROR"));
        assert!(!is_failed_order_status("Success"));
        assert!(!is_failed_order_status("Partial"));
    }
}
