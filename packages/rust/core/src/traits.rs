//! Collaborator seams of the digest pipeline.
//!
//! The pipeline only talks to the outside world through these traits.
//! Production implementations live in [`crate::adapters`] and
//! [`crate::summarizer`]; tests substitute in-memory fakes.

use async_trait::async_trait;

use newsdigest_shared::{Channel, DeliveryRecord, Digest, RawMessage, Result, SendFailure};

/// A channel as listed by the directory, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub handle: String,
    pub title: String,
}

/// Lists the channels that belong to a named group.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(&self, group: &str) -> Result<Vec<DirectoryEntry>>;
}

/// Persists registry channels and assigns their stable ids.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn upsert_channel(&self, handle: &str, title: &str) -> Result<Channel>;
}

/// Pages through a channel's history.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// One page of messages, newest first, strictly older than `before` when
    /// given. An empty page means there is no more history.
    async fn history_page(&self, handle: &str, before: Option<i64>) -> Result<Vec<RawMessage>>;
}

/// Turns rendered news items into digest text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, items: &[String]) -> Result<String>;
}

/// Sends one text message to one recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport's message id.
    async fn send(&self, user_id: i64, text: &str) -> std::result::Result<i64, SendFailure>;
}

/// Subscriber state as seen by delivery.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn active_subscribers(&self) -> Result<Vec<i64>>;
    async fn mark_interaction(&self, user_id: i64) -> Result<()>;
    async fn deactivate(&self, user_id: i64) -> Result<()>;
}

/// Keeps a copy of each digest and what happened to it.
#[async_trait]
pub trait DigestArchive: Send + Sync {
    /// Returns the archive id used to attach delivery records.
    async fn save_digest(&self, digest: &Digest) -> Result<String>;
    async fn record_delivery(&self, digest_id: &str, record: &DeliveryRecord) -> Result<()>;
}
