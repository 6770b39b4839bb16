//! Application configuration.
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `CLUBHOUSE` prefix
//! with `__` separating nested values:
//!
//! - `CLUBHOUSE__SERVER__PORT=8080` -> `server.port = 8080`
//! - `CLUBHOUSE__DATABASE__URL=...` -> `database.url = ...`
//! - `CLUBHOUSE__PROVIDERS__STRIPE__API_KEY=...` -> `providers.stripe.api_key`

mod database;
mod error;
mod providers;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use providers::{
    CloudPaymentsConfig, CoinbaseConfig, ProvidersConfig, StripeConfig, WayForPayConfig,
};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// Loads configuration from the environment, reading `.env` first when
    /// present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CLUBHOUSE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.providers.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
