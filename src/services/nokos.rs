use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{release, reserve};
use crate::error::{ShopError, ShopResult};
use crate::providers::{NumberAction, field_i64, field_str};
use crate::state::AppState;
use crate::types::{NokosOrder, OrderKind, User};

const CANCELED: &str = "canceled";
const COMPLETED: &str = "completed";
/// Rentals the vendor quotes outside this window fall back to its edge.
const MAX_RENTAL_MINUTES: i64 = 24 * 60;
const DEFAULT_RENTAL_MINUTES: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct NokosOrderInput {
    pub number_id: String,
    pub provider_id: String,
    #[serde(default)]
    pub operator_id: Option<String>,
    pub service_id: String,
    /// Price shown to the user when they picked the number.
    pub price: i64,
}

pub async fn services(state: &AppState) -> ShopResult<Value> {
    Ok(state.numbers.services().await?)
}

pub async fn countries(state: &AppState, service_id: &str) -> ShopResult<Value> {
    Ok(state.numbers.countries(service_id).await?)
}

pub async fn operators(state: &AppState, country: &str, provider_id: &str) -> ShopResult<Value> {
    Ok(state.numbers.operators(country, provider_id).await?)
}

/// Finds the current price of `number_id` from `provider_id` anywhere in a
/// country listing.
fn current_quote(listing: &Value, number_id: &str, provider_id: &str) -> Option<i64> {
    match listing {
        Value::Array(items) => items
            .iter()
            .find_map(|item| current_quote(item, number_id, provider_id)),
        Value::Object(map) => {
            let matches = field_str(listing, &["number_id"]).as_deref() == Some(number_id)
                && field_str(listing, &["provider_id"])
                    .is_none_or(|p| p == provider_id);
            if matches {
                if let Some(price) = field_i64(listing, &["price"]) {
                    return Some(price);
                }
            }
            map.values()
                .find_map(|v| current_quote(v, number_id, provider_id))
        }
        _ => None,
    }
}

/// Expiry of a rental starting at `now`, with the vendor's minute count
/// clamped to `1..=MAX_RENTAL_MINUTES`.
fn rental_expiry(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes.clamp(1, MAX_RENTAL_MINUTES))
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now + Duration::minutes(DEFAULT_RENTAL_MINUTES))
}

pub async fn order(
    state: &AppState,
    user: &User,
    input: NokosOrderInput,
    now: DateTime<Utc>,
) -> ShopResult<NokosOrder> {
    if input.price <= 0 {
        return Err(ShopError::InvalidInput("price must be positive".to_string()));
    }
    let listing = state.numbers.countries(&input.service_id).await?;
    let current = current_quote(&listing, &input.number_id, &input.provider_id).ok_or_else(|| {
        ShopError::InvalidInput("number is no longer offered".to_string())
    })?;
    if current != input.price {
        return Err(ShopError::PriceChanged {
            quoted: input.price,
            current,
        });
    }

    reserve(state, user, current).await?;
    let operator_id = input.operator_id.as_deref().unwrap_or("any");
    let rental = match state
        .numbers
        .rent(&input.number_id, &input.provider_id, operator_id)
        .await
    {
        Ok(rental) => rental,
        Err(e) => {
            warn!(user_id = %user.id, number_id = %input.number_id, error = %e, "number rental refused");
            return Err(release(state, user.id, current, e).await);
        }
    };

    let order = NokosOrder {
        id: Uuid::new_v4(),
        user_id: user.id,
        order_id: rental.order_id,
        provider_id: input.provider_id,
        service_name: rental.service,
        country_name: rental.country,
        phone_number: rental.phone_number,
        price: current,
        status: "waiting".to_string(),
        otp_code: "-".to_string(),
        refunded: false,
        expires_at: rental_expiry(now, rental.expires_in_minute),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.store.create_nokos_order(order.clone()).await {
        error!(
            user_id = %user.id,
            order_id = %order.order_id,
            price = current,
            error = %e,
            "number rented but not recorded"
        );
        return Err(e.into());
    }
    state.store.record_spend(user.id, current).await?;
    info!(
        user_id = %user.id,
        order_id = %order.order_id,
        phone = %order.phone_number,
        price = current,
        "number rented"
    );
    Ok(order)
}

pub async fn history(state: &AppState, user: &User) -> ShopResult<Vec<NokosOrder>> {
    Ok(state.store.nokos_orders_for_user(user.id).await?)
}

async fn owned_order(state: &AppState, user: &User, order_id: &str) -> ShopResult<NokosOrder> {
    state
        .store
        .nokos_order(order_id)
        .await?
        .filter(|o| o.user_id == user.id)
        .ok_or(ShopError::NotFound("order"))
}

async fn refund(state: &AppState, order: &NokosOrder) -> ShopResult<()> {
    if let Some(amount) = state.store.refund_order(OrderKind::Nokos, order.id).await? {
        info!(order_id = %order.order_id, user_id = %order.user_id, amount, "number rental refunded");
    }
    Ok(())
}

pub async fn check_status(state: &AppState, user: &User, order_id: &str) -> ShopResult<NokosOrder> {
    let order = owned_order(state, user, order_id).await?;
    let status = state.numbers.status(&order.order_id).await?;
    if status.status != order.status || status.otp_code != order.otp_code {
        state
            .store
            .update_nokos_status(order.id, &status.status, &status.otp_code)
            .await?;
    }
    if status.status.eq_ignore_ascii_case(CANCELED) {
        refund(state, &order).await?;
    }
    owned_order(state, user, order_id).await
}

pub async fn set_status(
    state: &AppState,
    user: &User,
    order_id: &str,
    action: NumberAction,
) -> ShopResult<NokosOrder> {
    let order = owned_order(state, user, order_id).await?;
    state.numbers.set_status(&order.order_id, action).await?;
    match action {
        NumberAction::Cancel => {
            state
                .store
                .update_nokos_status(order.id, CANCELED, &order.otp_code)
                .await?;
            refund(state, &order).await?;
        }
        NumberAction::Done => {
            state
                .store
                .update_nokos_status(order.id, COMPLETED, &order.otp_code)
                .await?;
        }
    }
    info!(order_id = %order.order_id, action = action.as_str(), "number status set");
    owned_order(state, user, order_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_is_found_in_nested_listing() {
        let listing = json!([
            {"name": "Indonesia", "pricelist": [
                {"number_id": 41, "provider_id": "7", "price": 2000},
                {"number_id": "42", "provider_id": 7, "price": "3500"}
            ]},
            {"name": "Malaysia", "pricelist": [
                {"number_id": 42, "provider_id": "9", "price": 9000}
            ]}
        ]);
        assert_eq!(current_quote(&listing, "42", "7"), Some(3500));
        assert_eq!(current_quote(&listing, "42", "9"), Some(9000));
        assert_eq!(current_quote(&listing, "43", "7"), None);
    }

    #[test]
    fn rental_expiry_is_clamped() {
        let now = Utc::now();
        assert_eq!(rental_expiry(now, 20), now + Duration::minutes(20));
        assert_eq!(rental_expiry(now, 0), now + Duration::minutes(1));
        assert_eq!(rental_expiry(now, -5), now + Duration::minutes(1));
        assert_eq!(rental_expiry(now, i64::MAX), now + Duration::minutes(MAX_RENTAL_MINUTES));
        assert_eq!(rental_expiry(now, i64::MIN), now + Duration::minutes(1));
    }
}
