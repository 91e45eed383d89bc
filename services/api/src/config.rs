use podcast_service::config::{Config, ConfigError};
use std::net::SocketAddr;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiConfigError {
    #[error(transparent)]
    Service(#[from] ConfigError),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: SocketAddr,
    pub service: Config,
}

impl ApiConfig {
    /// Loads configuration from environment variables.
    ///
    /// Reads everything [`Config::from_env`] does, plus:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    pub fn from_env() -> Result<Self, ApiConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiConfigError> {
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ApiConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        Ok(Self {
            bind_address,
            service: Config::from_lookup(lookup)?,
        })
    }
}
