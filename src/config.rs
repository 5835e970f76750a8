use serde::Deserialize;

/// Marker for `database_url` selecting the in-process store.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub bcrypt_cost: u32,
    /// Used for referral links and the sitemap.
    pub public_base_url: String,
    pub midtrans_server_key: String,
    pub midtrans_client_key: String,
    pub midtrans_production: bool,
    /// SMM and PPOB vendor.
    pub provider_api_key: String,
    pub provider_base_url: String,
    /// Virtual number vendor.
    pub otp_api_key: String,
    pub otp_base_url: String,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("server_port", 3000)?
            .set_default("database_url", MEMORY_DATABASE)?
            .set_default("jwt_secret", "storefront-dev-secret-change-me")?
            .set_default("jwt_ttl_secs", 86_400)?
            .set_default("bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .set_default("public_base_url", "http://localhost:3000")?
            .set_default("midtrans_server_key", "")?
            .set_default("midtrans_client_key", "")?
            .set_default("midtrans_production", false)?
            .set_default("provider_api_key", "")?
            .set_default("provider_base_url", "https://jagoanpedia.com/api")?
            .set_default("otp_api_key", "")?
            .set_default("otp_base_url", "https://www.rumahotp.com/api")?
            .set_default("mail_from", "Wanzofc Shop <no-reply@localhost>")?
            .add_source(config::Environment::default())
            .build()?;
        config.try_deserialize()
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }

    /// A configuration suitable for tests: in-memory store, dummy keys.
    pub fn for_tests() -> Self {
        Config {
            server_port: 0,
            database_url: MEMORY_DATABASE.to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_secs: 3600,
            bcrypt_cost: 4,
            public_base_url: "https://shop.test".to_string(),
            midtrans_server_key: "server-key".to_string(),
            midtrans_client_key: "client-key".to_string(),
            midtrans_production: false,
            provider_api_key: "provider-key".to_string(),
            provider_base_url: "http://provider.invalid".to_string(),
            otp_api_key: "otp-key".to_string(),
            otp_base_url: "http://otp.invalid".to_string(),
            mail_relay_url: None,
            mail_from: "shop@test".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_key() {
        // Keys absent from the environment fall back to their defaults.
        let cfg = Config::from_env().unwrap();
        assert!(cfg.jwt_ttl_secs > 0);
        assert!(!cfg.provider_base_url.is_empty());
    }
}
