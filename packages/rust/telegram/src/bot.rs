//! Telegram Bot API sender with failure classification.
//!
//! Every failed `sendMessage` call is mapped to a [`SendFailure`] here, so the
//! delivery engine never has to look at HTTP codes or error strings.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use newsdigest_shared::{NewsDigestError, Result, SendFailure, USER_AGENT};

/// Descriptions that mean the chat is gone for good, even on a 400.
const UNREACHABLE_MARKERS: &[&str] = &[
    "chat not found",
    "user not found",
    "user is deactivated",
    "bot was blocked",
    "bot was kicked",
];

/// Envelope returned by every Bot API method.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct BotClient {
    client: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BotClient {
    /// Create a client for `api_base` (normally `https://api.telegram.org`).
    pub fn new(api_base: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Send a plain-text message. Returns the Telegram message id.
    #[instrument(skip_all, fields(chat_id = %chat_id))]
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> std::result::Result<i64, SendFailure> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            // without_url: the request URL contains the bot token
            .map_err(|e| classify_transport_error(e.without_url()))?;

        let status = response.status().as_u16();
        let body: ApiResponse<SentMessage> = response
            .json()
            .await
            .map_err(|e| {
                SendFailure::unknown(format!(
                    "HTTP {status}: unreadable response: {}",
                    e.without_url()
                ))
            })?;

        match body {
            ApiResponse {
                ok: true,
                result: Some(sent),
                ..
            } => {
                debug!(message_id = sent.message_id, "message accepted");
                Ok(sent.message_id)
            }
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(classify_api_error(
                error_code.unwrap_or(status),
                description.as_deref().unwrap_or("no description"),
            )),
        }
    }
}

/// Classify a Bot API error by code and description.
pub fn classify_api_error(code: u16, description: &str) -> SendFailure {
    let message = format!("{code}: {description}");
    let lowered = description.to_lowercase();

    match code {
        403 => SendFailure::permanent(message),
        400 if UNREACHABLE_MARKERS.iter().any(|m| lowered.contains(m)) => {
            SendFailure::permanent(message)
        }
        429 | 500..=599 => SendFailure::transient(message),
        _ => SendFailure::unknown(message),
    }
}

fn classify_transport_error(e: reqwest::Error) -> SendFailure {
    if e.is_timeout() || e.is_connect() {
        SendFailure::transient(e.to_string())
    } else {
        SendFailure::unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdigest_shared::FailureKind;

    #[test]
    fn test_classify_api_error() {
        assert_eq!(
            classify_api_error(403, "Forbidden: bot was blocked by the user").kind,
            FailureKind::Permanent
        );
        assert_eq!(
            classify_api_error(400, "Bad Request: chat not found").kind,
            FailureKind::Permanent
        );
        assert_eq!(
            classify_api_error(400, "Bad Request: message text is empty").kind,
            FailureKind::Unknown
        );
        assert_eq!(
            classify_api_error(429, "Too Many Requests: retry after 5").kind,
            FailureKind::Transient
        );
        assert_eq!(
            classify_api_error(502, "Bad Gateway").kind,
            FailureKind::Transient
        );
    }

    async fn mount_reply(server: &wiremock::MockServer, status: u16, body: serde_json::Value) {
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/botTEST:TOKEN/sendMessage"))
            .respond_with(wiremock::ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_message_success() {
        let server = wiremock::MockServer::start().await;
        mount_reply(
            &server,
            200,
            json!({ "ok": true, "result": { "message_id": 77, "chat": { "id": 5 } } }),
        )
        .await;

        let bot = BotClient::new(&server.uri(), "TEST:TOKEN", Duration::from_secs(5)).unwrap();
        assert_eq!(bot.send_message(5, "hello").await.unwrap(), 77);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["chat_id"], 5);
        assert_eq!(sent["text"], "hello");
    }

    #[tokio::test]
    async fn test_send_message_blocked_is_permanent() {
        let server = wiremock::MockServer::start().await;
        mount_reply(
            &server,
            403,
            json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            }),
        )
        .await;

        let bot = BotClient::new(&server.uri(), "TEST:TOKEN", Duration::from_secs(5)).unwrap();
        let failure = bot.send_message(5, "hello").await.unwrap_err();
        assert!(failure.is_permanent());
        assert!(failure.description.contains("blocked"));
    }

    #[tokio::test]
    async fn test_send_message_timeout_is_transient() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({ "ok": true, "result": { "message_id": 1 } })),
            )
            .mount(&server)
            .await;

        let bot = BotClient::new(&server.uri(), "TEST:TOKEN", Duration::from_millis(200)).unwrap();
        let failure = bot.send_message(5, "hello").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(!failure.description.contains("TEST:TOKEN"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let bot =
            BotClient::new("https://api.telegram.org", "SECRET", Duration::from_secs(5)).unwrap();
        assert!(!format!("{bot:?}").contains("SECRET"));
    }
}
