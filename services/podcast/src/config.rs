//! Application Configuration Module
//!
//! Loads the podcast service settings from environment variables into a
//! single struct that is shared by both runtimes.

use podcast_core::policy::{EngagementPolicy, OracleTimeout, SessionPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewerProvider {
    OpenAI,
    /// Offline heuristics, no API key needed.
    Heuristic,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ReviewerProvider,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_dir: PathBuf,
    pub policy: SessionPolicy,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `REVIEWER_PROVIDER`: "openai" or "heuristic". Defaults to "openai".
    // *   `OPENAI_API_KEY`: Your secret key for the OpenAI API. Required if provider is "openai".
    // *   `CHAT_MODEL`: (Optional) The model used for analysis. Defaults to "gpt-4o-mini".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `ENGAGEMENT_PROFILE`: (Optional) "balanced" or "lenient". Defaults to "balanced".
    // *   `ORACLE_TIMEOUT_MS`: (Optional) Deadline for each analysis call. Defaults to 10000.
    // *   `PROMPTS_DIR`: (Optional) Directory of prompt templates. Defaults to "prompts".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so it can be tested
    /// without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider_str = lookup("REVIEWER_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => ReviewerProvider::OpenAI,
            "heuristic" => ReviewerProvider::Heuristic,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REVIEWER_PROVIDER".to_string(),
                    format!("'{other}' is not one of openai, heuristic"),
                ));
            }
        };

        let openai_api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let profile = lookup("ENGAGEMENT_PROFILE").unwrap_or_else(|| "balanced".to_string());
        let engagement = EngagementPolicy::from_profile(&profile).ok_or_else(|| {
            ConfigError::InvalidValue(
                "ENGAGEMENT_PROFILE".to_string(),
                format!("'{profile}' is not one of balanced, lenient"),
            )
        })?;

        let timeout_ms = match lookup("ORACLE_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("ORACLE_TIMEOUT_MS".to_string(), e.to_string())
            })?,
            None => DEFAULT_ORACLE_TIMEOUT_MS,
        };

        let prompts_dir = lookup("PROMPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("prompts"));

        // Validate that the API key is present for the selected provider.
        if provider == ReviewerProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            ));
        }

        Ok(Self {
            provider,
            openai_api_key,
            chat_model,
            log_level,
            prompts_dir,
            policy: SessionPolicy {
                engagement,
                oracle_timeout: OracleTimeout(Duration::from_millis(timeout_ms)),
                ..SessionPolicy::default()
            },
        })
    }
}
