pub mod config;
pub mod document;
pub mod prompt_loader;

use crate::config::{Config, ReviewerProvider};
use anyhow::{Context, Result};
use podcast_core::heuristic_reviewer::HeuristicReviewer;
use podcast_core::reviewer::{PROMPT_KEYS, Reviewer, ReviewerClient};
use std::sync::Arc;

/// Builds the analysis oracle selected by the configuration.
pub fn build_reviewer(config: &Config) -> Result<Arc<dyn Reviewer>> {
    match config.provider {
        ReviewerProvider::OpenAI => {
            let prompts = prompt_loader::load_required_prompts(&config.prompts_dir, &PROMPT_KEYS)
                .context("Failed to load LLM prompts")?;
            tracing::info!("Loaded {} prompts successfully.", prompts.len());
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY must be set for openai provider")?;
            Ok(Arc::new(ReviewerClient::new(
                api_key,
                config.chat_model.clone(),
                prompts,
            )))
        }
        ReviewerProvider::Heuristic => {
            tracing::info!("Using offline heuristic reviewer");
            Ok(Arc::new(HeuristicReviewer))
        }
    }
}
