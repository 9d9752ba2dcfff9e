//! Port for the language-model service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::LlmConfig;
use crate::domain::ports::errors::CollaboratorError;

/// Request parameters for a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl From<&LlmConfig> for CompletionParams {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }
}

/// Expensive, rate-limited text completion. Always called through the
/// retry wrapper and, for deterministic prompts, through the compute cache.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, CollaboratorError>;
}
