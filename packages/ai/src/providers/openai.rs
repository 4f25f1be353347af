//! `OpenAI` chat completions provider.
//!
//! Also works against `OpenAI`-compatible servers (Ollama, vLLM, llama.cpp,
//! LM Studio) through [`OpenAiProvider::with_base_url`].

use pyxten_http::RetryPolicy;
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::AiError;

/// Model used when `AI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` API provider.
pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new `OpenAI` provider. The key may be omitted for local
    /// servers.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Points the provider at another `OpenAI`-compatible server
    /// (e.g. `http://localhost:11434/v1`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [OpenAiMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> String {
        format!("OpenAI-compatible {}", self.model)
    }

    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, AiError> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: [
                OpenAiMessage {
                    role: "system",
                    content: system_prompt,
                },
                OpenAiMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: 2000,
            temperature: 0.1,
        };
        let url = format!("{}/chat/completions", self.base_url);

        let body = pyxten_http::send_json(RetryPolicy::default(), || {
            let builder = self.client.post(&url).json(&request);
            match &self.api_key {
                Some(key) => builder.bearer_auth(key),
                None => builder,
            }
        })
        .await?;

        extract_text(body)
    }
}

fn extract_text(body: serde_json::Value) -> Result<String, AiError> {
    let response: OpenAiResponse = serde_json::from_value(body)?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AiError::Provider {
            message: "No text content in OpenAI response".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice() {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "hola" }, "finish_reason": "stop" }]
        });
        assert_eq!(extract_text(body).unwrap(), "hola");
    }

    #[test]
    fn no_choices_is_error() {
        let body = serde_json::json!({ "choices": [] });
        assert!(matches!(extract_text(body), Err(AiError::Provider { .. })));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiProvider::new(reqwest::Client::new(), None, "llama3".to_string())
            .with_base_url("http://localhost:11434/v1/".to_string());
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }
}
