//! Core domain types for the daily digest pipeline.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NewsDigestError, Result};

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A source channel as known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable identifier assigned by the channel store.
    pub id: i64,
    /// Public handle without the leading `@`.
    pub handle: String,
    /// Display title.
    pub title: String,
    /// When the registry last refreshed this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// One entry of the materialized channel list (`channels.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListEntry {
    pub id: i64,
    pub username: String,
    pub title: String,
}

/// Root structure for `channels.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelList {
    #[serde(default)]
    pub channels: Vec<ChannelListEntry>,
}

impl From<&Channel> for ChannelListEntry {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            username: channel.handle.clone(),
            title: channel.title.clone(),
        }
    }
}

impl ChannelList {
    /// Build the persisted list from registry channels.
    pub fn from_channels(channels: &[Channel]) -> Self {
        Self {
            channels: channels.iter().map(ChannelListEntry::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// IngestionWindow
// ---------------------------------------------------------------------------

/// Half-open UTC time range `[start, end)` bounding which messages qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IngestionWindow {
    /// Build a window, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(NewsDigestError::validation(format!(
                "window start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole UTC calendar day before `now`: `[yesterday 00:00, today 00:00)`.
    pub fn previous_utc_day(now: DateTime<Utc>) -> Self {
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self {
            start: today - Duration::days(1),
            end: today,
        }
    }

    /// Whether `ts` falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// The calendar date a digest built from this window is filed under.
    pub fn digest_date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

impl std::fmt::Display for IngestionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Messages and items
// ---------------------------------------------------------------------------

/// A message as returned by a source reader, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: i64,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A message retained by the window filter.
///
/// Invariant: `window.start <= timestamp < window.end` and `text` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub text: String,
    pub source_channel: String,
    pub source_message_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl NewsItem {
    /// Permalink of the source message.
    pub fn permalink(&self, web_base: &str) -> String {
        format!(
            "{}/{}/{}",
            web_base.trim_end_matches('/'),
            self.source_channel,
            self.source_message_id
        )
    }

    /// Summarizer input line: the text followed by its source link.
    pub fn render(&self, web_base: &str) -> String {
        format!("{}\nSource: {}\n", self.text, self.permalink(web_base))
    }
}

// ---------------------------------------------------------------------------
// Digest and chunks
// ---------------------------------------------------------------------------

/// The summarized text for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub date: NaiveDate,
    pub content: String,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One transport-sized part of a digest.
///
/// `index` is 1-based. The header is only rendered when `total > 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub total: usize,
    pub body: String,
}

impl Chunk {
    /// The `part i/total` marker for a chunk position, including its separator.
    pub fn header(index: usize, total: usize) -> String {
        format!("part {index}/{total}\n\n")
    }

    /// The text sent to the recipient.
    pub fn text(&self) -> String {
        if self.total > 1 {
            let mut text = Self::header(self.index, self.total);
            text.push_str(&self.body);
            text
        } else {
            self.body.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Lifecycle state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    Active,
    Inactive,
}

impl SubscriberStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for SubscriberStatus {
    type Err = NewsDigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(NewsDigestError::parse(format!(
                "unknown subscriber status: {other}"
            ))),
        }
    }
}

/// A registered digest recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: SubscriberStatus,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// How a transport failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth trying again next cycle.
    Transient,
    /// The recipient can no longer be reached.
    Permanent,
    /// Unrecognized; handled like `Transient`.
    Unknown,
}

/// A failed send, as classified by the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} send failure: {description}")]
pub struct SendFailure {
    pub kind: FailureKind,
    pub description: String,
}

impl SendFailure {
    pub fn transient(description: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            description: description.into(),
        }
    }

    pub fn permanent(description: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            description: description.into(),
        }
    }

    pub fn unknown(description: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unknown,
            description: description.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

/// Result of one subscriber's delivery attempt within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

impl DeliveryOutcome {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TransientFailure => "transient_failure",
            Self::PermanentFailure => "permanent_failure",
        }
    }
}

impl std::str::FromStr for DeliveryOutcome {
    type Err = NewsDigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "transient_failure" => Ok(Self::TransientFailure),
            "permanent_failure" => Ok(Self::PermanentFailure),
            other => Err(NewsDigestError::parse(format!(
                "unknown delivery outcome: {other}"
            ))),
        }
    }
}

/// One subscriber's delivery result for one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub digest_date: NaiveDate,
    pub user_id: i64,
    pub outcome: DeliveryOutcome,
    /// Chunks accepted by the transport before success or abort.
    pub chunks_sent: usize,
    /// Transport description of the failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn previous_utc_day_is_half_open_yesterday() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap();
        let window = IngestionWindow::previous_utc_day(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
        assert_eq!(window.digest_date(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }

    #[test]
    fn window_rejects_inverted_range() {
        let t = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert!(IngestionWindow::new(t, t).is_err());
        assert!(IngestionWindow::new(t, t - Duration::hours(1)).is_err());
    }

    #[test]
    fn channel_list_uses_username_key() {
        let channels = vec![Channel {
            id: 7,
            handle: "ai_news".into(),
            title: "AI News".into(),
            last_checked_at: None,
        }];
        let json = serde_json::to_value(ChannelList::from_channels(&channels)).expect("serialize");
        assert_eq!(json["channels"][0]["username"], "ai_news");
        assert_eq!(json["channels"][0]["id"], 7);
        assert_eq!(json["channels"][0]["title"], "AI News");
    }

    #[test]
    fn news_item_renders_source_link() {
        let item = NewsItem {
            text: "GPT-9 released".into(),
            source_channel: "ai_news".into(),
            source_message_id: 42,
            timestamp: Utc::now(),
        };
        assert_eq!(
            item.render("https://t.me/"),
            "GPT-9 released\nSource: https://t.me/ai_news/42\n"
        );
    }

    #[test]
    fn chunk_header_only_when_split() {
        let single = Chunk {
            index: 1,
            total: 1,
            body: "hello".into(),
        };
        assert_eq!(single.text(), "hello");

        let part = Chunk {
            index: 2,
            total: 3,
            body: "world".into(),
        };
        assert_eq!(part.text(), "part 2/3\n\nworld");
    }

    #[test]
    fn status_and_outcome_parse() {
        assert_eq!("inactive".parse::<SubscriberStatus>().unwrap(), SubscriberStatus::Inactive);
        assert!("gone".parse::<SubscriberStatus>().is_err());
        assert_eq!(
            "permanent_failure".parse::<DeliveryOutcome>().unwrap(),
            DeliveryOutcome::PermanentFailure
        );
    }
}
