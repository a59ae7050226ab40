use crate::error::PaygateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "z-ai/glm-4.5-air:free";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes text concisely.";

/// The paid downstream service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Model identifier; part of the response-cache key.
    fn model(&self) -> &str;

    async fn summarize(&self, text: &str) -> Result<String, PaygateError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client for OpenRouter.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, PaygateError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PaygateError::ConfigError("OPENROUTER_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://microai.paygate")
            .header("X-Title", "MicroAI Paygate")
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|e| PaygateError::UpstreamError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaygateError::UpstreamError(format!(
                "OpenRouter API error: {} - {}",
                status, body
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| PaygateError::UpstreamError(format!("Invalid completion body: {}", e)))?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Summarizer for OpenRouterClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str) -> Result<String, PaygateError> {
        if text.is_empty() {
            return Err(PaygateError::InvalidRequest("Input text is required".to_string()));
        }

        let messages = vec![
            ChatMessage {
                role: "system",
                content: SUMMARY_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!("Please summarize the following text:\n\n{}", text),
            },
        ];

        let summary = self.complete(messages).await?;
        tracing::debug!(model = %self.model, chars = summary.len(), "Summary generated");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: String, key: Option<&str>) -> OpenRouterClient {
        OpenRouterClient::new(key.map(str::to_string), "test-model".to_string(), url)
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({ "model": "test-model" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Short."}}]}"#)
            .create_async()
            .await;

        let summary = client(server.url(), Some("test-key"))
            .summarize("A very long text")
            .await
            .unwrap();

        assert_eq!(summary, "Short.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_choices_yield_empty_summary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let summary = client(server.url(), Some("k")).summarize("text").await.unwrap();
        assert_eq!(summary, "");
    }

    #[tokio::test]
    async fn upstream_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = client(server.url(), Some("k")).summarize("text").await.unwrap_err();
        match err {
            PaygateError::UpstreamError(message) => assert!(message.contains("rate limited")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_api_key_is_configuration_error() {
        let err = client("http://127.0.0.1:1".to_string(), None)
            .summarize("text")
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::ConfigError(_)));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let err = client("http://127.0.0.1:1".to_string(), Some("k"))
            .summarize("")
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::InvalidRequest(_)));
    }
}
