//! LLM provider abstraction and implementations.
//!
//! Supports Anthropic Claude and `OpenAI`-compatible chat completion APIs
//! via a common trait.

pub mod anthropic;
pub mod openai;

use crate::AiError;

/// Trait for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider and model label for provenance records.
    fn name(&self) -> String;

    /// Sends one system prompt and one user prompt, returning the text of
    /// the reply.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the request fails or the reply has no text.
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, AiError>;
}

/// Creates an LLM provider based on environment variables.
///
/// If `AI_PROVIDER` is explicitly set, uses that provider. Otherwise
/// auto-detects from available credentials:
///
/// 1. `ANTHROPIC_API_KEY` set -> Anthropic Claude
/// 2. `OPENAI_API_KEY` or `AI_BASE_URL` set -> `OpenAI`-compatible
///
/// `AI_MODEL` overrides the model; `AI_BASE_URL` points the `OpenAI`
/// provider at a self-hosted server, in which case the key is optional.
///
/// # Errors
///
/// Returns [`AiError::Config`] if no credentials are found or the
/// explicitly requested provider is not configured.
pub fn create_provider_from_env(client: reqwest::Client) -> Result<Box<dyn LlmProvider>, AiError> {
    let provider = std::env::var("AI_PROVIDER").unwrap_or_else(|_| detect_provider());
    let model = std::env::var("AI_MODEL").ok().filter(|m| !m.is_empty());

    match provider.to_lowercase().as_str() {
        "anthropic" | "claude" => {
            let api_key = env_non_empty("ANTHROPIC_API_KEY").ok_or_else(|| AiError::Config {
                message: "ANTHROPIC_API_KEY environment variable not set".to_string(),
            })?;
            let model = model.unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string());
            Ok(Box::new(anthropic::AnthropicProvider::new(client, api_key, model)))
        }
        "openai" | "gpt" => {
            let base_url = env_non_empty("AI_BASE_URL");
            let api_key = env_non_empty("OPENAI_API_KEY");
            if api_key.is_none() && base_url.is_none() {
                return Err(AiError::Config {
                    message: "OPENAI_API_KEY environment variable not set".to_string(),
                });
            }
            let model = model.unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
            let mut provider = openai::OpenAiProvider::new(client, api_key, model);
            if let Some(base_url) = base_url {
                provider = provider.with_base_url(base_url);
            }
            Ok(Box::new(provider))
        }
        other => Err(AiError::Config {
            message: format!("Unknown AI provider: {other}. Use 'anthropic' or 'openai'."),
        }),
    }
}

/// Returns `true` if any AI credentials are configured.
#[must_use]
pub fn credentials_available() -> bool {
    ["AI_PROVIDER", "ANTHROPIC_API_KEY", "OPENAI_API_KEY", "AI_BASE_URL"]
        .iter()
        .any(|var| env_non_empty(var).is_some())
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Auto-detects which provider to use based on available credentials.
fn detect_provider() -> String {
    if env_non_empty("ANTHROPIC_API_KEY").is_some() {
        log::info!("Auto-detected AI provider: Anthropic (ANTHROPIC_API_KEY found)");
        return "anthropic".to_string();
    }

    if env_non_empty("OPENAI_API_KEY").is_some() || env_non_empty("AI_BASE_URL").is_some() {
        log::info!("Auto-detected AI provider: OpenAI-compatible");
        return "openai".to_string();
    }

    log::warn!(
        "No AI credentials detected. Set ANTHROPIC_API_KEY, OPENAI_API_KEY or AI_BASE_URL. \
         You can also set AI_PROVIDER explicitly."
    );

    // Produces a clear error about the missing key.
    "anthropic".to_string()
}
