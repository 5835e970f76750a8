use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{is_failed_order_status, release, reserve};
use crate::error::{ShopError, ShopResult};
use crate::pricing::smm_price;
use crate::providers::{SmmOrderRequest, SmmService};
use crate::state::AppState;
use crate::types::{OrderKind, SmmOrder, User};

const PENDING: &str = "Pending";
const PROCESSING: &str = "Processing";

#[derive(Debug, Clone, Deserialize)]
pub struct SmmOrderInput {
    pub service_id: String,
    pub target_link: String,
    pub quantity: i64,
    #[serde(default)]
    pub custom_comments: Option<String>,
}

pub async fn services(state: &AppState) -> ShopResult<Vec<SmmService>> {
    Ok(state.smm.services().await?)
}

fn check_quantity(service: &SmmService, quantity: i64) -> ShopResult<()> {
    if quantity <= 0 {
        return Err(ShopError::InvalidInput("quantity must be positive".to_string()));
    }
    if let Some(min) = service.min.filter(|min| quantity < *min) {
        return Err(ShopError::InvalidInput(format!("minimum quantity is {min}")));
    }
    if let Some(max) = service.max.filter(|max| quantity > *max) {
        return Err(ShopError::InvalidInput(format!("maximum quantity is {max}")));
    }
    Ok(())
}

pub async fn order(
    state: &AppState,
    user: &User,
    input: SmmOrderInput,
    now: DateTime<Utc>,
) -> ShopResult<SmmOrder> {
    let target = input.target_link.trim();
    if target.is_empty() {
        return Err(ShopError::InvalidInput("target link is required".to_string()));
    }
    let service = state
        .smm
        .services()
        .await?
        .into_iter()
        .find(|s| s.id == input.service_id)
        .ok_or(ShopError::NotFound("service"))?;
    check_quantity(&service, input.quantity)?;
    let price = smm_price(input.quantity, service.rate);

    reserve(state, user, price).await?;
    let request = SmmOrderRequest {
        service_id: service.id.clone(),
        target: target.to_string(),
        quantity: input.quantity,
        custom_comments: input.custom_comments.filter(|c| !c.trim().is_empty()),
    };
    let provider_order_id = match state.smm.place_order(&request).await {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = %user.id, service_id = %service.id, error = %e, "smm order refused");
            return Err(release(state, user.id, price, e).await);
        }
    };

    let order = SmmOrder {
        id: Uuid::new_v4(),
        user_id: user.id,
        provider_order_id,
        service_id: service.id,
        service_name: service.name,
        target_link: target.to_string(),
        quantity: input.quantity,
        price,
        start_count: 0,
        remains: input.quantity,
        status: PENDING.to_string(),
        refunded: false,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.store.create_smm_order(order.clone()).await {
        error!(
            user_id = %user.id,
            provider_order_id = %order.provider_order_id,
            price,
            error = %e,
            "smm order placed but not recorded"
        );
        return Err(e.into());
    }
    state.store.record_spend(user.id, price).await?;
    info!(
        user_id = %user.id,
        order_id = %order.id,
        provider_order_id = %order.provider_order_id,
        price,
        "smm order placed"
    );
    Ok(order)
}

/// Pulls the provider state of one open order, refunding it if the provider
/// gave up on it.
async fn refresh(state: &AppState, order: &SmmOrder) -> ShopResult<()> {
    let status = state.smm.status(&order.provider_order_id).await?;
    state
        .store
        .update_smm_progress(order.id, &status.status, status.start_count, status.remains)
        .await?;
    if is_failed_order_status(&status.status) && !order.refunded {
        if let Some(amount) = state.store.refund_order(OrderKind::Smm, order.id).await? {
            info!(order_id = %order.id, user_id = %order.user_id, amount, "smm order refunded");
        }
    }
    Ok(())
}

pub async fn history(state: &AppState, user: &User) -> ShopResult<Vec<SmmOrder>> {
    let orders = state.store.smm_orders_for_user(user.id).await?;
    for order in orders
        .iter()
        .filter(|o| o.status == PENDING || o.status == PROCESSING)
    {
        if let Err(e) = refresh(state, order).await {
            warn!(order_id = %order.id, error = %e, "could not refresh smm order");
        }
    }
    Ok(state.store.smm_orders_for_user(user.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn service(min: Option<i64>, max: Option<i64>) -> SmmService {
        SmmService {
            id: "1".into(),
            name: "Likes".into(),
            category: "Instagram".into(),
            rate: Decimal::from(10_000),
            min,
            max,
        }
    }

    #[test]
    fn quantity_bounds_are_enforced_when_declared() {
        assert!(check_quantity(&service(Some(100), Some(1000)), 100).is_ok());
        assert!(check_quantity(&service(Some(100), Some(1000)), 99).is_err());
        assert!(check_quantity(&service(Some(100), Some(1000)), 1001).is_err());
        assert!(check_quantity(&service(None, None), 5).is_ok());
        assert!(check_quantity(&service(None, None), 0).is_err());
    }
}
