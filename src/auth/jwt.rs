use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ShopError, ShopResult};
use crate::types::Role;

const ISSUER: &str = "storefront";

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    /// Role at sign-in. Authorization re-reads the account, this is only a hint
    /// for clients.
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct JwtManager {
    ttl_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Returns the token and its expiry (unix seconds).
    pub fn issue(&self, user_id: Uuid, username: &str, role: Role) -> ShopResult<(String, i64)> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.ttl_secs);
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: ISSUER.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to sign session token: {e}"))?;
        Ok((token, exp.timestamp()))
    }

    pub fn verify(&self, token: &str) -> ShopResult<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ShopError::Unauthorized("session expired".to_string())
                }
                _ => ShopError::Unauthorized("invalid session token".to_string()),
            }
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let jwt = JwtManager::new("secret", 60);
        let id = Uuid::new_v4();
        let (token, exp) = jwt.issue(id, "alice", Role::Seller).unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Seller);
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn foreign_or_expired_tokens_are_rejected() {
        let ours = JwtManager::new("secret", 60);
        let theirs = JwtManager::new("other", 60);
        let (token, _) = theirs.issue(Uuid::new_v4(), "mallory", Role::Admin).unwrap();
        assert!(matches!(ours.verify(&token), Err(ShopError::Unauthorized(_))));

        // Beyond the default 60 s leeway.
        let stale = JwtManager::new("secret", -3600);
        let (token, _) = stale.issue(Uuid::new_v4(), "bob", Role::Member).unwrap();
        let err = ours.verify(&token).unwrap_err();
        assert_eq!(err.to_string(), "session expired");
    }
}
