use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ShopError, ShopResult};
use crate::pricing::MIN_DEPOSIT;
use crate::providers::{CheckoutRequest, GatewayNotification};
use crate::state::AppState;
use crate::types::{Deposit, DepositStatus, User};

#[derive(Debug, Clone, Serialize)]
pub struct DepositCheckout {
    pub order_id: String,
    pub amount: i64,
    pub snap_token: String,
    pub redirect_url: String,
    pub client_key: String,
}

/// What a verified gateway notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    UnknownOrder,
    AlreadySettled,
    Settled,
    Failed,
    Recorded,
}

fn new_order_id(now: DateTime<Utc>) -> String {
    let suffix = rand::rng().random_range(0..1000);
    format!("DEP-{}-{suffix}", now.timestamp_millis())
}

pub async fn create(
    state: &AppState,
    user: &User,
    amount: i64,
    now: DateTime<Utc>,
) -> ShopResult<DepositCheckout> {
    if amount < MIN_DEPOSIT {
        return Err(ShopError::AmountTooSmall { min: MIN_DEPOSIT });
    }
    let order_id = new_order_id(now);
    let checkout = state
        .gateway
        .create_checkout(&CheckoutRequest {
            order_id: order_id.clone(),
            amount,
            customer_name: user.fullname.clone(),
            customer_email: user.email.clone(),
        })
        .await?;

    state
        .store
        .create_deposit(Deposit {
            id: Uuid::new_v4(),
            user_id: user.id,
            order_id: order_id.clone(),
            amount,
            status: DepositStatus::Pending,
            snap_token: Some(checkout.token.clone()),
            payment_type: None,
            payment_time: None,
            created_at: now,
        })
        .await?;
    info!(user_id = %user.id, %order_id, amount, "deposit created");

    Ok(DepositCheckout {
        order_id,
        amount,
        snap_token: checkout.token,
        redirect_url: checkout.redirect_url,
        client_key: state.gateway.client_key().to_string(),
    })
}

/// Applies a gateway notification. The body is trusted only for its order id;
/// the transaction state is fetched from the gateway itself.
pub async fn handle_notification(
    state: &AppState,
    notification: &GatewayNotification,
    now: DateTime<Utc>,
) -> ShopResult<NotificationOutcome> {
    if !state.gateway.verify_notification(notification) {
        warn!(order_id = %notification.order_id, "rejected notification with bad signature");
        return Err(ShopError::InvalidSignature);
    }

    let order_id = notification.order_id.as_str();
    let Some(deposit) = state.store.deposit_by_order_id(order_id).await? else {
        warn!(%order_id, "notification for unknown deposit");
        return Ok(NotificationOutcome::UnknownOrder);
    };
    if deposit.status == DepositStatus::Success {
        return Ok(NotificationOutcome::AlreadySettled);
    }

    let status = state.gateway.transaction_status(order_id).await?;
    let payment_type = status
        .payment_type
        .as_deref()
        .or(notification.payment_type.as_deref());

    if status.is_paid() {
        return match state
            .store
            .settle_deposit(order_id, payment_type, now)
            .await?
        {
            Some(settled) => {
                info!(
                    %order_id,
                    user_id = %settled.user.id,
                    amount = settled.deposit.amount,
                    balance = settled.user.balance,
                    rank = %settled.user.rank,
                    "deposit settled"
                );
                if let Some((referrer, commission)) = settled.commission {
                    info!(%order_id, %referrer, commission, "referral commission paid");
                }
                Ok(NotificationOutcome::Settled)
            }
            None => Ok(NotificationOutcome::AlreadySettled),
        };
    }

    if status.is_failed() {
        if state
            .store
            .fail_deposit(order_id, payment_type, now)
            .await?
            .is_some()
        {
            info!(%order_id, status = %status.transaction_status, "deposit failed");
        }
        return Ok(NotificationOutcome::Failed);
    }

    state
        .store
        .record_payment_type(order_id, payment_type)
        .await?;
    Ok(NotificationOutcome::Recorded)
}

pub async fn history(state: &AppState, user: &User) -> ShopResult<Vec<Deposit>> {
    Ok(state.store.deposits_for_user(user.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_embed_the_timestamp() {
        let now = Utc::now();
        let id = new_order_id(now);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DEP");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert!(parts[2].parse::<u32>().unwrap() < 1000);
    }
}
