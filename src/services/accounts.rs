use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{bonus, load_user};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::totp;
use crate::error::{ShopError, ShopResult};
use crate::mailer::Email;
use crate::state::AppState;
use crate::types::{DEFAULT_PICTURE, LeaderboardEntry, News, Rank, Role, User};

const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERRAL_ATTEMPTS: usize = 8;
const DASHBOARD_LEADERS: i64 = 5;
const DASHBOARD_NEWS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub referral: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
    /// When present the account must hold exactly this role.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub fullname: String,
    pub username: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: User,
    /// Milliseconds until the daily bonus can be claimed again.
    pub daily_cooldown_ms: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub smm_orders: i64,
    pub ppob_orders: i64,
    pub news: Vec<News>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Affiliate {
    pub referral_code: String,
    pub referral_link: String,
    pub referral_earnings: i64,
}

fn referral_candidate() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| REFERRAL_ALPHABET[rng.random_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect();
    format!("REF-{suffix}")
}

fn verification_code() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

fn required(field: &str, value: &str) -> ShopResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ShopError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

async fn unused_referral_code(state: &AppState) -> ShopResult<String> {
    for _ in 0..REFERRAL_ATTEMPTS {
        let code = referral_candidate();
        if state.store.user_by_referral_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(anyhow::anyhow!("could not allocate a unique referral code").into())
}

pub async fn register(
    state: &AppState,
    input: RegisterInput,
    now: DateTime<Utc>,
) -> ShopResult<User> {
    let fullname = required("fullname", &input.fullname)?;
    let username = required("username", &input.username)?;
    let email = required("email", &input.email)?.to_lowercase();
    if !email.contains('@') {
        return Err(ShopError::InvalidInput("email is not valid".to_string()));
    }
    if input.password.is_empty() {
        return Err(ShopError::InvalidInput("password is required".to_string()));
    }
    if input.password != input.confirm_password {
        return Err(ShopError::InvalidInput("passwords do not match".to_string()));
    }

    // An unknown referral code is dropped rather than rejected.
    let referred_by = match input.referral.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => state
            .store
            .user_by_referral_code(code)
            .await?
            .map(|referrer| referrer.referral_code),
        _ => None,
    };

    let user = User {
        id: Uuid::new_v4(),
        fullname,
        username,
        email,
        password_hash: hash_password(&input.password, state.config.bcrypt_cost)?,
        role: Role::Member,
        balance: 0,
        profile_pic: DEFAULT_PICTURE.to_string(),
        is_verified: false,
        verification_code: None,
        two_factor_secret: None,
        two_factor_enabled: false,
        rank: Rank::Bronze,
        total_deposit: 0,
        referral_code: unused_referral_code(state).await?,
        referred_by,
        referral_earnings: 0,
        last_daily_claim: None,
        monthly_spend: 0,
        created_at: now,
        updated_at: now,
    };
    let user = state.store.create_user(user).await?;
    info!(user_id = %user.id, username = %user.username, "account registered");
    Ok(user)
}

pub async fn login(state: &AppState, input: LoginInput, now: DateTime<Utc>) -> ShopResult<Session> {
    let bad_credentials = || ShopError::Unauthorized("invalid username or password".to_string());
    let user = state
        .store
        .user_by_username(input.username.trim())
        .await?
        .ok_or_else(bad_credentials)?;
    if !verify_password(&input.password, &user.password_hash) {
        return Err(bad_credentials());
    }
    if user.role == Role::Banned {
        return Err(ShopError::Forbidden("account is banned".to_string()));
    }
    if input.role.is_some_and(|role| role != user.role) {
        return Err(ShopError::Unauthorized(
            "account does not hold the requested role".to_string(),
        ));
    }
    if user.two_factor_enabled {
        let token = input.token.as_deref().ok_or(ShopError::TwoFactorRequired)?;
        let secret = user.two_factor_secret.as_deref().unwrap_or_default();
        if !totp::verify(secret, token, now.timestamp()) {
            return Err(ShopError::Unauthorized("invalid two-factor token".to_string()));
        }
    }

    let (token, expires_at) = state.jwt.issue(user.id, &user.username, user.role)?;
    info!(user_id = %user.id, "signed in");
    Ok(Session {
        token,
        expires_at,
        user,
    })
}

pub async fn update_profile(
    state: &AppState,
    user: &User,
    update: ProfileUpdate,
) -> ShopResult<User> {
    let fullname = required("fullname", &update.fullname)?;
    let username = required("username", &update.username)?;
    let profile_pic = update
        .profile_pic
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    Ok(state
        .store
        .update_profile(user.id, &fullname, &username, profile_pic)
        .await?)
}

pub async fn request_verification(state: &AppState, user: &User) -> ShopResult<()> {
    if user.is_verified {
        return Err(ShopError::Conflict("email is already verified".to_string()));
    }
    let code = verification_code();
    state
        .store
        .set_verification_code(user.id, Some(&code))
        .await?;
    state
        .mailer
        .send(Email {
            to: user.email.clone(),
            subject: "Kode Verifikasi Email".to_string(),
            html: format!(
                "<p>Halo {},</p><p>Kode verifikasi Anda: <b>{code}</b></p>",
                user.fullname
            ),
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

pub async fn check_verification(state: &AppState, user: &User, code: &str) -> ShopResult<User> {
    let current = load_user(state, user.id).await?;
    match current.verification_code.as_deref() {
        Some(expected) if expected == code.trim() => {
            state.store.mark_verified(user.id).await?;
            load_user(state, user.id).await
        }
        _ => Err(ShopError::InvalidInput("invalid verification code".to_string())),
    }
}

pub async fn setup_two_factor(state: &AppState, user: &User) -> ShopResult<TwoFactorSetup> {
    if user.two_factor_enabled {
        return Err(ShopError::Conflict("two-factor is already enabled".to_string()));
    }
    let secret = totp::generate_secret();
    state
        .store
        .set_two_factor(user.id, Some(&secret), false)
        .await?;
    let settings = super::site::settings(state).await;
    Ok(TwoFactorSetup {
        otpauth_uri: totp::otpauth_uri(&settings.website_title, &user.email, &secret),
        secret,
    })
}

pub async fn enable_two_factor(
    state: &AppState,
    user: &User,
    token: &str,
    now: DateTime<Utc>,
) -> ShopResult<()> {
    let current = load_user(state, user.id).await?;
    let secret = current
        .two_factor_secret
        .ok_or_else(|| ShopError::InvalidInput("two-factor setup has not been started".into()))?;
    if !totp::verify(&secret, token, now.timestamp()) {
        return Err(ShopError::InvalidInput("invalid two-factor token".to_string()));
    }
    state.store.set_two_factor(user.id, Some(&secret), true).await?;
    info!(user_id = %user.id, "two-factor enabled");
    Ok(())
}

pub async fn disable_two_factor(state: &AppState, user: &User) -> ShopResult<()> {
    state.store.set_two_factor(user.id, None, false).await?;
    info!(user_id = %user.id, "two-factor disabled");
    Ok(())
}

/// News the `role` may read, newest first.
pub(crate) async fn visible_news(
    state: &AppState,
    role: Role,
    limit: Option<usize>,
) -> ShopResult<Vec<News>> {
    let news = state.store.list_news(None).await?;
    Ok(news
        .into_iter()
        .filter(|n| n.audience.includes(role))
        .take(limit.unwrap_or(usize::MAX))
        .collect())
}

pub async fn dashboard(state: &AppState, user: &User, now: DateTime<Utc>) -> ShopResult<Dashboard> {
    let leaders = state.store.top_users_by_balance(DASHBOARD_LEADERS).await?;
    let (smm_orders, ppob_orders) = state.store.order_counts_for_user(user.id).await?;
    Ok(Dashboard {
        daily_cooldown_ms: bonus::cooldown_remaining_ms(user, now),
        leaderboard: leaders.iter().map(LeaderboardEntry::from).collect(),
        smm_orders,
        ppob_orders,
        news: visible_news(state, user.role, Some(DASHBOARD_NEWS)).await?,
        user: user.clone(),
    })
}

pub async fn information(state: &AppState, user: &User) -> ShopResult<Vec<News>> {
    visible_news(state, user.role, None).await
}

pub fn affiliate(state: &AppState, user: &User) -> Affiliate {
    Affiliate {
        referral_link: format!(
            "{}/auth/register?referral={}",
            state.config.public_base_url.trim_end_matches('/'),
            user.referral_code
        ),
        referral_code: user.referral_code.clone(),
        referral_earnings: user.referral_earnings,
    }
}
