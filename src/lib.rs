//! A multi-tenant digital-goods storefront: wallets, a user marketplace,
//! resold SMM, PPOB and virtual-number services, and payment-gateway deposits.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod pricing;
pub mod providers;
pub mod responses;
pub mod services;
pub mod state;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;

pub use api::init_router;
pub use config::Config;
pub use error::{ShopError, ShopResult};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store, init_pool};

/// Opens the store named by `config.database_url`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    if config.uses_memory_store() {
        tracing::warn!("using the in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let pool = init_pool(&config.database_url).await?;
    Ok(Arc::new(PgStore::new(pool)))
}
