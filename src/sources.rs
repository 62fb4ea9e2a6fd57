//! Content-source collaborator seam and raw-event preparation.
//!
//! Polling protocol mechanics live outside this crate; a provider only has
//! to yield raw events in the agreed shape. Preparation normalizes the text
//! (HTML entities, tags, whitespace), drops empties, deduplicates identical
//! texts within a recency window, and maps events into `ContentItem`s.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::content::{ContentItem, ContentType, SourceTag};

/// Texts identical within this window are treated as duplicates.
pub const DEFAULT_DEDUP_WINDOW_SECS: i64 = 600;

/// Raw item as yielded by a poller: `{id, author, text, timestamp, hint}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContentEvent {
    pub id: String,
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_hint: Option<String>,
}

/// One polled ingestion source.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_latest(&self) -> Result<Vec<RawContentEvent>>;
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("content_events_total", "Raw events fetched from providers.");
        describe_counter!("content_kept_total", "Events kept after normalization.");
        describe_counter!("content_dropped_total", "Empty events dropped.");
        describe_counter!("content_dedup_total", "Events removed as duplicates.");
        describe_counter!("content_provider_errors_total", "Provider fetch errors.");
    });
}

/// Normalize text: decode HTML entities, strip tags, unify quotes, collapse
/// whitespace, drop trailing sentence punctuation, cap at 1500 chars.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Map a raw event into an unprocessed `ContentItem`, classifying it from
/// the channel hint.
pub fn into_item(event: RawContentEvent) -> ContentItem {
    let hint = event
        .channel_hint
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (source, content_type) = if hint.contains("twitter") || hint.contains("x.com") {
        (SourceTag::Social, ContentType::Tweet)
    } else if hint.contains("youtube") || hint.contains("video") {
        (SourceTag::Feed, ContentType::Video)
    } else if hint.contains("research") || hint.contains("notes") {
        (SourceTag::Research, ContentType::Research)
    } else if hint.contains("podcast") {
        (SourceTag::Feed, ContentType::Podcast)
    } else {
        (SourceTag::Channel, ContentType::Post)
    };

    ContentItem::new(
        event.id,
        source,
        content_type,
        event.text,
        event.author,
        event.timestamp,
    )
}

/// Normalize, drop empties, and dedup a raw batch. Returns the surviving
/// items in arrival order plus `(dropped_empty, deduped)` counts.
pub fn prepare_batch(
    now: DateTime<Utc>,
    raw: Vec<RawContentEvent>,
    dedup_window_secs: i64,
) -> (Vec<ContentItem>, usize, usize) {
    let mut dropped = 0usize;
    let mut deduped = 0usize;
    let mut seen_texts: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for mut ev in raw {
        ev.text = normalize_text(&ev.text);
        if ev.text.is_empty() {
            dropped += 1;
            continue;
        }
        let is_recent = (now - ev.timestamp) <= Duration::seconds(dedup_window_secs);
        if is_recent && !seen_texts.insert(ev.text.clone()) {
            deduped += 1;
            continue;
        }
        out.push(into_item(ev));
    }
    (out, dropped, deduped)
}

/// Fetch from every provider, tolerating per-provider failures, and prepare
/// the combined batch. Provider errors are logged and counted, never fatal.
pub async fn poll_once(
    providers: &[Box<dyn ContentProvider>],
    dedup_window_secs: i64,
) -> (Vec<ContentItem>, usize, usize) {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(provider = p.name(), error = ?e, "content provider error");
                counter!("content_provider_errors_total").increment(1);
            }
        }
    }
    counter!("content_events_total").increment(raw.len() as u64);

    let (kept, dropped, deduped) = prepare_batch(Utc::now(), raw, dedup_window_secs);
    counter!("content_kept_total").increment(kept.len() as u64);
    counter!("content_dropped_total").increment(dropped as u64);
    counter!("content_dedup_total").increment(deduped as u64);
    (kept, dropped, deduped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, text: &str, age_secs: i64) -> RawContentEvent {
        RawContentEvent {
            id: id.into(),
            author: "tester".into(),
            text: text.into(),
            timestamp: Utc::now() - Duration::seconds(age_secs),
            channel_hint: None,
        }
    }

    #[test]
    fn normalize_strips_html_and_punctuation() {
        let out = normalize_text("  <b>Bitcoin&nbsp;breakout</b> incoming!!!  ");
        assert_eq!(out, "Bitcoin breakout incoming");
    }

    #[test]
    fn empty_after_normalize_is_dropped() {
        let (kept, dropped, _) = prepare_batch(Utc::now(), vec![ev("a", "<br/> ", 0)], 600);
        assert!(kept.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn dedup_applies_within_window_only() {
        let now = Utc::now();
        let events = vec![
            ev("a", "same text", 5),
            ev("b", "same text", 6),
            ev("c", "same text", 7000), // outside the 600s window
        ];
        let (kept, _, deduped) = prepare_batch(now, events, 600);
        assert_eq!(kept.len(), 2);
        assert_eq!(deduped, 1);
    }

    #[test]
    fn channel_hint_classifies_source() {
        let mut e = ev("a", "hello", 0);
        e.channel_hint = Some("twitter/main".into());
        let item = into_item(e);
        assert_eq!(item.source, SourceTag::Social);
        assert_eq!(item.content_type, ContentType::Tweet);

        let item2 = into_item(ev("b", "hello", 0));
        assert_eq!(item2.source, SourceTag::Channel);
    }
}
