use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::load_user;
use crate::error::{ShopError, ShopResult};
use crate::pricing::{DAILY_BONUS_MAX, DAILY_BONUS_MIN};
use crate::state::AppState;
use crate::types::{LeaderboardEntry, User, VoucherKind};

const LEADERBOARD_SIZE: i64 = 20;

pub fn daily_cooldown() -> Duration {
    Duration::hours(24)
}

pub fn cooldown_remaining_ms(user: &User, now: DateTime<Utc>) -> i64 {
    user.last_daily_claim
        .map(|last| (last + daily_cooldown() - now).num_milliseconds().max(0))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
pub struct Credited {
    pub amount: i64,
    pub balance: i64,
}

fn daily_amount() -> i64 {
    rand::rng().random_range(DAILY_BONUS_MIN..=DAILY_BONUS_MAX)
}

pub async fn claim_daily(state: &AppState, user: &User, now: DateTime<Utc>) -> ShopResult<Credited> {
    let remaining_ms = cooldown_remaining_ms(user, now);
    if remaining_ms > 0 {
        return Err(ShopError::TooEarly { remaining_ms });
    }
    let amount = daily_amount();
    match state
        .store
        .claim_daily_bonus(user.id, amount, now, daily_cooldown())
        .await?
    {
        Some(balance) => {
            info!(user_id = %user.id, amount, "daily bonus claimed");
            Ok(Credited { amount, balance })
        }
        // Lost a race against a concurrent claim.
        None => {
            let current = load_user(state, user.id).await?;
            Err(ShopError::TooEarly {
                remaining_ms: cooldown_remaining_ms(&current, now),
            })
        }
    }
}

pub async fn redeem(
    state: &AppState,
    user: &User,
    code: &str,
    now: DateTime<Utc>,
) -> ShopResult<Credited> {
    let voucher = state
        .store
        .voucher_by_code(&code.trim().to_uppercase(), VoucherKind::Balance)
        .await?
        .ok_or(ShopError::VoucherInvalid)?;
    let balance = state
        .store
        .redeem_balance_voucher(voucher.id, user.id, now)
        .await?
        .ok_or(ShopError::VoucherInvalid)?;
    info!(user_id = %user.id, code = %voucher.code, amount = voucher.value, "voucher redeemed");
    Ok(Credited {
        amount: voucher.value,
        balance,
    })
}

pub async fn leaderboard(state: &AppState) -> ShopResult<Vec<LeaderboardEntry>> {
    let users = state.store.top_users_by_balance(LEADERBOARD_SIZE).await?;
    Ok(users.iter().map(LeaderboardEntry::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_amount_stays_in_range() {
        for _ in 0..200 {
            let amount = daily_amount();
            assert!((DAILY_BONUS_MIN..=DAILY_BONUS_MAX).contains(&amount));
        }
    }
}
