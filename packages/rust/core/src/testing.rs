//! In-memory fakes for the pipeline traits (test builds only).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use newsdigest_shared::{
    Channel, DeliveryRecord, Digest, NewsDigestError, RawMessage, Result, SendFailure,
};

use crate::traits::{
    ChannelDirectory, ChannelStore, DigestArchive, DirectoryEntry, MessageSource,
    SubscriberStore, Summarizer, Transport,
};

// ---------------------------------------------------------------------------
// Directory + channel store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDirectory {
    groups: HashMap<String, Vec<String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, name: &str, handles: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            handles.iter().map(|h| h.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl ChannelDirectory for FakeDirectory {
    async fn list_channels(&self, group: &str) -> Result<Vec<DirectoryEntry>> {
        let handles = self
            .groups
            .get(group)
            .ok_or_else(|| NewsDigestError::Registry(format!("unknown group {group}")))?;
        Ok(handles
            .iter()
            .map(|h| DirectoryEntry {
                handle: h.clone(),
                title: h.to_uppercase(),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeChannelStore {
    channels: Mutex<Vec<Channel>>,
}

#[async_trait]
impl ChannelStore for FakeChannelStore {
    async fn upsert_channel(&self, handle: &str, title: &str) -> Result<Channel> {
        let mut channels = self.channels.lock().unwrap();
        if let Some(existing) = channels.iter_mut().find(|c| c.handle == handle) {
            existing.title = title.to_string();
            existing.last_checked_at = Some(Utc::now());
            return Ok(existing.clone());
        }
        let channel = Channel {
            id: channels.len() as i64 + 1,
            handle: handle.to_string(),
            title: title.to_string(),
            last_checked_at: Some(Utc::now()),
        };
        channels.push(channel.clone());
        Ok(channel)
    }
}

// ---------------------------------------------------------------------------
// Message source
// ---------------------------------------------------------------------------

/// Serves canned history pages. `before = None` yields the first page;
/// `before = Some(id)` yields the page after the one whose oldest id is `id`.
#[derive(Default)]
pub struct FakeSource {
    pages: HashMap<String, Vec<Vec<RawMessage>>>,
    failing: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, handle: &str, pages: Vec<Vec<RawMessage>>) -> Self {
        self.pages.insert(handle.to_string(), pages);
        self
    }

    pub fn failing(mut self, handle: &str) -> Self {
        self.failing.push(handle.to_string());
        self
    }

    pub fn pages_served(&self, handle: &str) -> usize {
        self.calls.lock().unwrap().get(handle).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn history_page(&self, handle: &str, before: Option<i64>) -> Result<Vec<RawMessage>> {
        *self.calls.lock().unwrap().entry(handle.to_string()).or_default() += 1;

        if self.failing.iter().any(|h| h == handle) {
            return Err(NewsDigestError::ingestion(handle, "connection reset"));
        }
        let Some(pages) = self.pages.get(handle) else {
            return Ok(Vec::new());
        };

        let index = match before {
            None => 0,
            Some(id) => match pages
                .iter()
                .position(|p| p.iter().map(|m| m.id).min() == Some(id))
            {
                Some(i) => i + 1,
                None => return Ok(Vec::new()),
            },
        };
        Ok(pages.get(index).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

pub struct FakeSummarizer {
    reply: Option<String>,
    inputs: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Items passed to the most recent call.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, items: &[String]) -> Result<String> {
        *self.inputs.lock().unwrap() = items.to_vec();
        self.reply
            .clone()
            .ok_or_else(|| NewsDigestError::Summarization("HTTP 503: upstream unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Records sends; fails the configured (user, attempt) pairs.
#[derive(Default)]
pub struct FakeTransport {
    failures: HashMap<(i64, usize), SendFailure>,
    sent: Mutex<Vec<(i64, String)>>,
    attempts: Mutex<HashMap<i64, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`-th (0-based) send to `user_id`.
    pub fn fail_at(mut self, user_id: i64, attempt: usize, failure: SendFailure) -> Self {
        self.failures.insert((user_id, attempt), failure);
        self
    }

    /// Texts successfully sent to `user_id`, in order.
    pub fn sent_to(&self, user_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn attempts_to(&self, user_id: i64) -> usize {
        self.attempts.lock().unwrap().get(&user_id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, user_id: i64, text: &str) -> std::result::Result<i64, SendFailure> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(user_id).or_default();
            *n += 1;
            *n - 1
        };
        if let Some(failure) = self.failures.get(&(user_id, attempt)) {
            return Err(failure.clone());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((user_id, text.to_string()));
        Ok(sent.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Subscribers + archive
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSubscribers {
    active: Mutex<Vec<i64>>,
    interactions: Mutex<Vec<i64>>,
    broken: bool,
}

impl FakeSubscribers {
    pub fn with_active(users: &[i64]) -> Self {
        Self {
            active: Mutex::new(users.to_vec()),
            ..Self::default()
        }
    }

    /// Make `mark_interaction` and `deactivate` fail.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn active(&self) -> Vec<i64> {
        self.active.lock().unwrap().clone()
    }

    pub fn interactions(&self) -> Vec<i64> {
        self.interactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriberStore for FakeSubscribers {
    async fn active_subscribers(&self) -> Result<Vec<i64>> {
        Ok(self.active())
    }

    async fn mark_interaction(&self, user_id: i64) -> Result<()> {
        if self.broken {
            return Err(NewsDigestError::Storage("database is locked".into()));
        }
        self.interactions.lock().unwrap().push(user_id);
        Ok(())
    }

    async fn deactivate(&self, user_id: i64) -> Result<()> {
        if self.broken {
            return Err(NewsDigestError::Storage("database is locked".into()));
        }
        self.active.lock().unwrap().retain(|u| *u != user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeArchive {
    digests: Mutex<Vec<Digest>>,
    records: Mutex<Vec<DeliveryRecord>>,
    broken_digests: bool,
    broken_records: bool,
}

impl FakeArchive {
    /// Make both `save_digest` and `record_delivery` fail.
    pub fn broken(mut self) -> Self {
        self.broken_digests = true;
        self.broken_records = true;
        self
    }

    /// Make only `record_delivery` fail.
    pub fn broken_records(mut self) -> Self {
        self.broken_records = true;
        self
    }

    pub fn digests(&self) -> Vec<Digest> {
        self.digests.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DigestArchive for FakeArchive {
    async fn save_digest(&self, digest: &Digest) -> Result<String> {
        if self.broken_digests {
            return Err(NewsDigestError::Storage("disk full".into()));
        }
        let mut digests = self.digests.lock().unwrap();
        digests.push(digest.clone());
        Ok(format!("digest-{}", digests.len()))
    }

    async fn record_delivery(&self, _digest_id: &str, record: &DeliveryRecord) -> Result<()> {
        if self.broken_records {
            return Err(NewsDigestError::Storage("disk full".into()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
