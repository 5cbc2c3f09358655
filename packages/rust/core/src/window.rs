//! Ingestion window filter.
//!
//! Walks a channel's history newest-first and keeps the text messages whose
//! timestamp falls inside the window. Each fetched page is filtered in full,
//! so a message that arrives out of order within a page is still seen.
//! Paging stops after the first page reaching back past `window.start`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use newsdigest_shared::{IngestionWindow, NewsItem, Result};

use crate::traits::MessageSource;

/// Why a channel scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// A page contained a message older than the window.
    ReachedWindowStart,
    /// The source returned an empty page.
    HistoryExhausted,
    /// The scan-depth bound was hit.
    ScanLimit,
}

/// Items kept from one channel plus scan statistics.
#[derive(Debug, Clone)]
pub struct ChannelScan {
    pub items: Vec<NewsItem>,
    pub scanned: usize,
    pub stop: ScanStop,
}

/// Collect the news items of one channel that fall inside `window`.
///
/// Items come back in history order (newest first). Message ids already seen
/// are skipped, so overlapping pages never duplicate an item.
#[instrument(skip_all, fields(handle = %handle))]
pub async fn scan_channel(
    source: &dyn MessageSource,
    handle: &str,
    window: &IngestionWindow,
    max_scan_messages: usize,
) -> Result<ChannelScan> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut scanned = 0usize;
    let mut before: Option<i64> = None;
    let mut newest_seen: Option<DateTime<Utc>> = None;

    let stop = loop {
        let page = source.history_page(handle, before).await?;
        if page.is_empty() {
            break ScanStop::HistoryExhausted;
        }

        let mut reached_start = false;
        let mut oldest_id = before;
        let mut limit_hit = false;

        for msg in page {
            oldest_id = Some(oldest_id.map_or(msg.id, |id| id.min(msg.id)));
            if !seen.insert(msg.id) {
                continue;
            }
            scanned += 1;

            if let Some(prev) = newest_seen {
                if msg.timestamp > prev {
                    debug!(
                        message_id = msg.id,
                        timestamp = %msg.timestamp,
                        previous = %prev,
                        "out-of-order message in history"
                    );
                }
            }
            newest_seen = Some(msg.timestamp);

            if msg.timestamp < window.start {
                reached_start = true;
            } else if window.contains(msg.timestamp) {
                match msg.text {
                    Some(text) if !text.trim().is_empty() => items.push(NewsItem {
                        text,
                        source_channel: handle.to_string(),
                        source_message_id: msg.id,
                        timestamp: msg.timestamp,
                    }),
                    _ => {}
                }
            }

            if scanned >= max_scan_messages {
                limit_hit = true;
                break;
            }
        }

        if limit_hit {
            warn!(scanned, "scan limit reached before window start");
            break ScanStop::ScanLimit;
        }
        if reached_start {
            break ScanStop::ReachedWindowStart;
        }
        // A source that ignores the cursor would loop forever.
        if oldest_id == before {
            break ScanStop::HistoryExhausted;
        }
        before = oldest_id;
    };

    debug!(items = items.len(), scanned, ?stop, "channel scanned");
    Ok(ChannelScan {
        items,
        scanned,
        stop,
    })
}
