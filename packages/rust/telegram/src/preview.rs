//! Parser for Telegram's public channel preview pages (`t.me/s/<handle>`).
//!
//! A page lists up to ~20 posts, oldest first. Each post is a
//! `.tgme_widget_message` element carrying `data-post="<handle>/<id>"`,
//! an optional `.tgme_widget_message_text` body and a `time[datetime]`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use newsdigest_shared::RawMessage;

static MESSAGE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tgme_widget_message[data-post]").expect("message selector")
});

static TEXT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tgme_widget_message_text").expect("text selector")
});

static TIME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tgme_widget_message_date time[datetime], time[datetime]")
        .expect("time selector")
});

static OG_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("og:title selector")
});

/// Parse one preview page into messages, newest first.
///
/// Posts without a parseable id or timestamp are skipped.
pub(crate) fn parse_history_page(html: &str) -> Vec<RawMessage> {
    let doc = Html::parse_document(html);
    let mut messages: Vec<RawMessage> = doc
        .select(&MESSAGE_SEL)
        .filter_map(|el| {
            let post = el.value().attr("data-post")?;
            let Some(id) = post_id(post) else {
                debug!(post, "skipping post with unparseable id");
                return None;
            };
            let Some(timestamp) = post_timestamp(el) else {
                debug!(post, "skipping post without timestamp");
                return None;
            };
            let text = el
                .select(&TEXT_SEL)
                .next()
                .map(element_text)
                .filter(|t| !t.trim().is_empty());
            Some(RawMessage {
                id,
                text,
                timestamp,
            })
        })
        .collect();

    messages.sort_by(|a, b| b.id.cmp(&a.id));
    messages
}

/// Extract the channel display title from `og:title`.
pub(crate) fn parse_channel_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&OG_TITLE_SEL)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `"ai_news/103"` → `103`.
fn post_id(post: &str) -> Option<i64> {
    post.rsplit_once('/')?.1.parse().ok()
}

fn post_timestamp(el: ElementRef<'_>) -> Option<DateTime<Utc>> {
    let raw = el.select(&TIME_SEL).next()?.value().attr("datetime")?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Collect text content, turning `<br>` into newlines.
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/telegram/{name}"))
            .expect("read telegram fixture")
    }

    #[test]
    fn test_parse_history_page_newest_first() {
        let messages = parse_history_page(&fixture("channel_preview.html"));
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![104, 103, 102, 101]);

        let m103 = &messages[1];
        assert_eq!(
            m103.text.as_deref(),
            Some("New agent framework released & open sourced")
        );
        assert_eq!(
            m103.timestamp,
            Utc.with_ymd_and_hms(2026, 3, 14, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_line_breaks_and_media_posts() {
        let messages = parse_history_page(&fixture("channel_preview.html"));
        let m101 = messages.iter().find(|m| m.id == 101).unwrap();
        assert_eq!(
            m101.text.as_deref(),
            Some("Open weights model tops the leaderboard\nBenchmarks inside.")
        );

        // Photo-only post has no text body
        let m102 = messages.iter().find(|m| m.id == 102).unwrap();
        assert!(m102.text.is_none());
    }

    #[test]
    fn test_empty_page() {
        assert!(parse_history_page(&fixture("channel_preview_empty.html")).is_empty());
    }

    #[test]
    fn test_channel_title() {
        assert_eq!(
            parse_channel_title(&fixture("channel_preview.html")).as_deref(),
            Some("AI News")
        );
        assert_eq!(parse_channel_title("<html><head></head></html>"), None);
    }

    #[test]
    fn test_post_id() {
        assert_eq!(post_id("ai_news/103"), Some(103));
        assert_eq!(post_id("ai_news"), None);
        assert_eq!(post_id("ai_news/abc"), None);
    }
}
