use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::auth::JwtManager;
use crate::config::Config;
use crate::mailer::{LogMailer, Mailer, RelayMailer};
use crate::providers::{
    JagoanClient, MidtransClient, NumberProvider, PaymentGateway, PpobProvider, RumahOtpClient,
    SmmProvider,
};
use crate::store::Store;

/// The application state.
#[derive(Clone)]
pub struct AppState {
    /// The application configuration.
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub smm: Arc<dyn SmmProvider>,
    pub ppob: Arc<dyn PpobProvider>,
    pub numbers: Arc<dyn NumberProvider>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtManager,
}

impl AppState {
    /// Wires the live vendor clients around `store`.
    pub fn from_config(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        // Notification signatures are keyed on it.
        if config.midtrans_server_key.trim().is_empty() {
            bail!("midtrans_server_key must be set");
        }
        let gateway = MidtransClient::new(
            &config.midtrans_server_key,
            &config.midtrans_client_key,
            config.midtrans_production,
        )
        .context("Failed to build payment gateway client")?;
        let reseller = Arc::new(
            JagoanClient::new(&config.provider_base_url, &config.provider_api_key)
                .context("Failed to build reseller client")?,
        );
        let numbers = RumahOtpClient::new(&config.otp_base_url, &config.otp_api_key)
            .context("Failed to build number vendor client")?;
        let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
            Some(url) => Arc::new(
                RelayMailer::new(url, &config.mail_from).context("Failed to build mailer")?,
            ),
            None => Arc::new(LogMailer),
        };

        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_ttl_secs);
        Ok(Self {
            config: Arc::new(config),
            store,
            gateway: Arc::new(gateway),
            smm: reseller.clone(),
            ppob: reseller,
            numbers: Arc::new(numbers),
            mailer,
            jwt,
        })
    }

    /// Assembles a state from ready-made parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        smm: Arc<dyn SmmProvider>,
        ppob: Arc<dyn PpobProvider>,
        numbers: Arc<dyn NumberProvider>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_ttl_secs);
        Self {
            config: Arc::new(config),
            store,
            gateway,
            smm,
            ppob,
            numbers,
            mailer,
            jwt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn empty_gateway_key_is_refused() {
        let mut config = Config::for_tests();
        config.midtrans_server_key = "  ".to_string();
        let err = AppState::from_config(config, Arc::new(MemoryStore::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("midtrans_server_key"));

        assert!(AppState::from_config(Config::for_tests(), Arc::new(MemoryStore::new())).is_ok());
    }
}
