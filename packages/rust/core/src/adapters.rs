//! Production implementations of the pipeline traits.
//!
//! Telegram preview pages feed history and titles, the Bot API carries
//! digests, and libSQL storage backs channels, subscribers and the archive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use newsdigest_shared::{
    AppConfig, Channel, ChannelGroup, CycleConfig, DeliveryRecord, Digest, NewsDigestError,
    RawMessage, Result, SendFailure, read_secret,
};
use newsdigest_storage::Storage;
use newsdigest_telegram::{BotClient, PreviewClient, normalize_handle};

use crate::pipeline::{DigestPipeline, PipelineDeps};
use crate::summarizer::ChatSummarizer;
use crate::traits::{
    ChannelDirectory, ChannelStore, DigestArchive, DirectoryEntry, MessageSource,
    SubscriberStore, Transport,
};

// ---------------------------------------------------------------------------
// Channel directory backed by config groups
// ---------------------------------------------------------------------------

/// Channel groups declared in config, with titles looked up on the web.
pub struct ConfigDirectory {
    groups: Vec<ChannelGroup>,
    titles: Option<PreviewClient>,
}

impl ConfigDirectory {
    /// `titles` is optional; without it every title falls back to the handle.
    pub fn new(groups: Vec<ChannelGroup>, titles: Option<PreviewClient>) -> Self {
        Self { groups, titles }
    }
}

#[async_trait]
impl ChannelDirectory for ConfigDirectory {
    async fn list_channels(&self, group: &str) -> Result<Vec<DirectoryEntry>> {
        let group = self
            .groups
            .iter()
            .find(|g| g.name == group)
            .ok_or_else(|| NewsDigestError::Registry(format!("unknown channel group {group:?}")))?;

        let mut entries = Vec::with_capacity(group.channels.len());
        for raw in &group.channels {
            let handle = match normalize_handle(raw) {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "ignoring invalid channel reference");
                    continue;
                }
            };

            let title = match &self.titles {
                Some(client) => match client.channel_title(&handle).await {
                    Ok(Some(title)) => title,
                    Ok(None) => handle.clone(),
                    Err(e) => {
                        warn!(%handle, error = %e, "title lookup failed, using handle");
                        handle.clone()
                    }
                },
                None => handle.clone(),
            };
            entries.push(DirectoryEntry { handle, title });
        }

        debug!(group = %group.name, channels = entries.len(), "group resolved");
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Telegram clients
// ---------------------------------------------------------------------------

#[async_trait]
impl MessageSource for PreviewClient {
    async fn history_page(&self, handle: &str, before: Option<i64>) -> Result<Vec<RawMessage>> {
        PreviewClient::history_page(self, handle, before).await
    }
}

#[async_trait]
impl Transport for BotClient {
    async fn send(&self, user_id: i64, text: &str) -> std::result::Result<i64, SendFailure> {
        self.send_message(user_id, text).await
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[async_trait]
impl ChannelStore for Storage {
    async fn upsert_channel(&self, handle: &str, title: &str) -> Result<Channel> {
        Storage::upsert_channel(self, handle, title).await
    }
}

#[async_trait]
impl SubscriberStore for Storage {
    async fn active_subscribers(&self) -> Result<Vec<i64>> {
        Storage::active_subscribers(self).await
    }

    async fn mark_interaction(&self, user_id: i64) -> Result<()> {
        Storage::mark_interaction(self, user_id).await
    }

    async fn deactivate(&self, user_id: i64) -> Result<()> {
        Storage::deactivate(self, user_id).await
    }
}

#[async_trait]
impl DigestArchive for Storage {
    async fn save_digest(&self, digest: &Digest) -> Result<String> {
        Storage::save_digest(self, digest).await
    }

    async fn record_delivery(&self, digest_id: &str, record: &DeliveryRecord) -> Result<()> {
        Storage::record_delivery(self, digest_id, record).await
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build the production pipeline from config. Reads secrets from the env.
pub fn build_pipeline(config: &AppConfig, storage: Arc<Storage>) -> Result<DigestPipeline> {
    let timeout = Duration::from_secs(config.telegram.request_timeout_secs);
    let preview = PreviewClient::new(&config.telegram.web_base, timeout)?;

    let token = read_secret(&config.telegram.bot_token_env, "Telegram bot token")?;
    let bot = BotClient::new(&config.telegram.api_base, token, timeout)?;

    let summarizer = ChatSummarizer::from_config(&config.summarizer)?;

    let deps = PipelineDeps {
        directory: Arc::new(ConfigDirectory::new(
            config.groups.clone(),
            Some(preview.clone()),
        )),
        channel_store: storage.clone(),
        source: Arc::new(preview),
        summarizer: Arc::new(summarizer),
        transport: Arc::new(bot),
        subscribers: storage.clone(),
        archive: storage,
        channels_file: Some(config.storage.channels_file()?),
    };
    Ok(DigestPipeline::new(deps, CycleConfig::from(config)))
}
