use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{is_failed_order_status, release, reserve};
use crate::error::{ShopError, ShopResult};
use crate::providers::{PpobOrderRequest, PpobService};
use crate::state::AppState;
use crate::types::{OrderKind, PpobOrder, User};

const PENDING: &str = "Pending";

#[derive(Debug, Clone, Deserialize)]
pub struct PpobOrderInput {
    pub service_code: String,
    pub target_number: String,
}

pub async fn services(state: &AppState) -> ShopResult<Vec<PpobService>> {
    Ok(state.ppob.services().await?)
}

pub async fn order(
    state: &AppState,
    user: &User,
    input: PpobOrderInput,
    now: DateTime<Utc>,
) -> ShopResult<PpobOrder> {
    let target = input.target_number.trim();
    if target.is_empty() {
        return Err(ShopError::InvalidInput("target number is required".to_string()));
    }
    let service = state
        .ppob
        .services()
        .await?
        .into_iter()
        .find(|s| s.code == input.service_code)
        .ok_or(ShopError::NotFound("service"))?;
    let price = service.price;

    reserve(state, user, price).await?;
    let request = PpobOrderRequest {
        service_code: service.code.clone(),
        target: target.to_string(),
    };
    let provider_order_id = match state.ppob.place_order(&request).await {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = %user.id, code = %service.code, error = %e, "ppob order refused");
            return Err(release(state, user.id, price, e).await);
        }
    };

    let order = PpobOrder {
        id: Uuid::new_v4(),
        user_id: user.id,
        provider_order_id,
        service_code: service.code,
        product_name: service.name,
        target_number: target.to_string(),
        price,
        sn: "-".to_string(),
        note: None,
        status: PENDING.to_string(),
        refunded: false,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.store.create_ppob_order(order.clone()).await {
        error!(
            user_id = %user.id,
            provider_order_id = %order.provider_order_id,
            price,
            error = %e,
            "ppob order placed but not recorded"
        );
        return Err(e.into());
    }
    state.store.record_spend(user.id, price).await?;
    info!(
        user_id = %user.id,
        order_id = %order.id,
        provider_order_id = %order.provider_order_id,
        price,
        "ppob order placed"
    );
    Ok(order)
}

async fn refresh(state: &AppState, order: &PpobOrder) -> ShopResult<()> {
    let status = state.ppob.status(&order.provider_order_id).await?;
    state
        .store
        .update_ppob_progress(order.id, &status.status, status.sn.as_deref())
        .await?;
    if is_failed_order_status(&status.status) && !order.refunded {
        if let Some(amount) = state.store.refund_order(OrderKind::Ppob, order.id).await? {
            info!(order_id = %order.id, user_id = %order.user_id, amount, "ppob order refunded");
        }
    }
    Ok(())
}

pub async fn history(state: &AppState, user: &User) -> ShopResult<Vec<PpobOrder>> {
    let orders = state.store.ppob_orders_for_user(user.id).await?;
    for order in orders.iter().filter(|o| o.status == PENDING) {
        if let Err(e) = refresh(state, order).await {
            warn!(order_id = %order.id, error = %e, "could not refresh ppob order");
        }
    }
    Ok(state.store.ppob_orders_for_user(user.id).await?)
}
