//! LLM completion provider: `complete(prompt) -> string`. The caller is
//! responsible for extracting JSON from the completion; the provider only
//! strives for strict-JSON mode when the backend supports it.

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt, returning the raw text completion.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Identifier used in logs and the index's `embedModelId`-style cache keys.
    fn model_id(&self) -> &str;
}

/// OpenRouter-compatible chat-completions client.
pub struct OpenRouterProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenRouterProvider {
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("invalid API key: {}", e)))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(OpenRouterProvider {
            client,
            base_url,
            model,
        })
    }

    /// Try once with strict JSON mode; if the backend rejects the
    /// `response_format` parameter, fall back to a plain completion.
    async fn send(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("LLM API error ({}): {}", status, body)));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider("LLM response had no choices".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "sending completion request");
        match self.send(prompt, true).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "strict JSON mode failed, retrying in plain-text mode");
                self.send(prompt, false).await
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Scripted stub for tests: replays a fixed queue of responses, never makes
/// a network call.
pub struct StubLlmProvider {
    responses: tokio::sync::Mutex<std::collections::VecDeque<String>>,
    model: String,
}

impl StubLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        StubLlmProvider {
            responses: tokio::sync::Mutex::new(responses.into()),
            model: "stub".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut q = self.responses.lock().await;
        q.pop_front()
            .ok_or_else(|| Error::Provider("stub LLM provider exhausted its script".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_replays_in_order() {
        let stub = StubLlmProvider::new(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(stub.complete("x").await.unwrap(), "first");
        assert_eq!(stub.complete("x").await.unwrap(), "second");
        assert!(stub.complete("x").await.is_err());
    }
}
