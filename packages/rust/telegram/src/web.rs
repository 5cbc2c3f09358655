//! HTTP client for public channel preview pages.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use newsdigest_shared::{NewsDigestError, RawMessage, Result, USER_AGENT};

use crate::preview;

/// Reads channel history and metadata from `{web_base}/s/{handle}`.
#[derive(Debug, Clone)]
pub struct PreviewClient {
    client: Client,
    web_base: String,
}

impl PreviewClient {
    /// Create a client against `web_base` (normally `https://t.me`).
    pub fn new(web_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(3))
            .timeout(timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            web_base: web_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one page of history, newest first.
    ///
    /// With `before`, returns posts with ids strictly below it. An empty
    /// page means the history is exhausted.
    #[instrument(skip_all, fields(handle = %handle, before = ?before))]
    pub async fn history_page(&self, handle: &str, before: Option<i64>) -> Result<Vec<RawMessage>> {
        let url = format!("{}/s/{handle}", self.web_base);
        let mut request = self.client.get(&url);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }

        let body = fetch_text(request, &url)
            .await
            .map_err(|e| NewsDigestError::ingestion(handle, e.to_string()))?;

        let mut messages = preview::parse_history_page(&body);
        // The preview endpoint may echo the anchor post; keep strictly older ones.
        if let Some(before) = before {
            messages.retain(|m| m.id < before);
        }
        debug!(count = messages.len(), "history page fetched");
        Ok(messages)
    }

    /// Look up the channel's display title. `None` when the page has none.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn channel_title(&self, handle: &str) -> Result<Option<String>> {
        let url = format!("{}/{handle}", self.web_base);
        let body = fetch_text(self.client.get(&url), &url).await?;
        Ok(preview::parse_channel_title(&body))
    }
}

async fn fetch_text(request: reqwest::RequestBuilder, url: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| NewsDigestError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(NewsDigestError::Network(format!("{url}: channel not found")));
    }
    if !status.is_success() {
        return Err(NewsDigestError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| NewsDigestError::Network(format!("{url}: failed to read body: {e}")))
}
