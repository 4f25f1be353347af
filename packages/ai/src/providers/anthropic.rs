//! Anthropic Claude provider implementation.

use pyxten_http::RetryPolicy;
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::AiError;

/// Model used when `AI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic Claude API provider.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider.
    #[must_use]
    pub const fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client,
        }
    }
}

/// Anthropic API request body.
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Anthropic API response body.
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> String {
        format!("Anthropic {}", self.model)
    }

    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, AiError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: 2000,
            temperature: 0.1,
            system: system_prompt,
            messages: [AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let body = pyxten_http::send_json(RetryPolicy::default(), || {
            self.client
                .post(MESSAGES_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request)
        })
        .await?;

        extract_text(body)
    }
}

fn extract_text(body: serde_json::Value) -> Result<String, AiError> {
    let response: AnthropicResponse = serde_json::from_value(body)?;
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text),
            AnthropicContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(AiError::Provider {
            message: "Anthropic response has no text content".to_string(),
        });
    }
    Ok(text)
}
