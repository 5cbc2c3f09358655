//! OpenAI-compatible chat-completions summarizer (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use newsdigest_shared::{NewsDigestError, Result, SummarizerConfig, USER_AGENT, read_secret};

use crate::traits::Summarizer;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client producing one digest per call.
pub struct ChatSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
}

impl ChatSummarizer {
    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env, "summarizer API key")?;
        Self::new(config, api_key)
    }

    /// Build with an explicit API key.
    pub fn new(config: &SummarizerConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    #[instrument(skip_all, fields(model = %self.model, items = items.len()))]
    async fn summarize(&self, items: &[String]) -> Result<String> {
        let input = items.join("\n\n");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &input,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(input_chars = input.chars().count(), "requesting summary");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NewsDigestError::Summarization(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsDigestError::Summarization(format!(
                "HTTP {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NewsDigestError::Summarization(format!("invalid response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NewsDigestError::Summarization("model returned no content".into()))?;

        info!(output_chars = content.chars().count(), "summary received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(base_url: &str) -> SummarizerConfig {
        SummarizerConfig {
            base_url: base_url.to_string(),
            ..SummarizerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_summarize_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
            .and(wiremock::matchers::header("user-agent", USER_AGENT))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Daily digest.\n" } }]
            })))
            .mount(&server)
            .await;

        let summarizer = ChatSummarizer::new(&config(&server.uri()), "sk-test").unwrap();
        let items = vec!["one\nSource: a".to_string(), "two\nSource: b".to_string()];
        let digest = summarizer.summarize(&items).await.unwrap();
        assert_eq!(digest, "Daily digest.");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["max_tokens"], 3000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "one\nSource: a\n\ntwo\nSource: b");
    }

    #[tokio::test]
    async fn test_empty_completion_is_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "   " } }]
            })))
            .mount(&server)
            .await;

        let summarizer = ChatSummarizer::new(&config(&server.uri()), "sk-test").unwrap();
        let err = summarizer.summarize(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, NewsDigestError::Summarization(_)));
    }

    #[tokio::test]
    async fn test_http_error_is_summarization_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(401).set_body_string("invalid api key"),
            )
            .mount(&server)
            .await;

        let summarizer = ChatSummarizer::new(&config(&server.uri()), "sk-bad").unwrap();
        let err = summarizer.summarize(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
