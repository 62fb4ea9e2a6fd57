//! Data model for one unit of ingested content.
//!
//! A `ContentItem` is created at ingestion, mutated exactly once by the
//! signal extractor (which sets `processed` and `insights`), retained until
//! the store's retention window expires, and never otherwise touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated origin of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Chat-channel message (Discord/Telegram style).
    Channel,
    /// Social post (tweet etc.).
    Social,
    /// Long-form research note.
    Research,
    /// Generic feed item.
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Post,
    Tweet,
    Video,
    Article,
    Research,
    Podcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    Medium,
    Low,
}

/// Free-form metadata attached at ingestion and refined by analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_assets: Vec<String>,
}

/// Link from a content item back to an evaluated prediction outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub prediction_id: String,
    pub note: String,
}

/// Detected insight lists, filled in by the signal extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentInsights {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predictions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub market_signals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceRecord>,
}

impl ContentInsights {
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
            && self.action_items.is_empty()
            && self.market_signals.is_empty()
            && self.performance.is_none()
    }
}

/// One unit of ingested content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub source: SourceTag,
    pub content_type: ContentType,
    pub text: String,
    pub metadata: ContentMetadata,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<ContentInsights>,
}

impl ContentItem {
    /// Fresh, unprocessed item with neutral/low metadata defaults.
    pub fn new(
        id: impl Into<String>,
        source: SourceTag,
        content_type: ContentType,
        text: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            content_type,
            text: text.into(),
            metadata: ContentMetadata {
                author: author.into(),
                timestamp,
                source_url: None,
                tags: Vec::new(),
                sentiment: Sentiment::Neutral,
                importance: Importance::Low,
                mentioned_assets: Vec::new(),
            },
            processed: false,
            insights: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.source_url = Some(url.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.metadata.tags = tags;
        self
    }

    /// Number of extracted predictions (0 when unprocessed).
    pub fn prediction_count(&self) -> usize {
        self.insights.as_ref().map_or(0, |i| i.predictions.len())
    }

    /// Number of extracted market signals (0 when unprocessed).
    pub fn market_signal_count(&self) -> usize {
        self.insights.as_ref().map_or(0, |i| i.market_signals.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_item_shape_is_stable() {
        let item = ContentItem::new(
            "c-1",
            SourceTag::Channel,
            ContentType::Post,
            "Bitcoin breakout incoming",
            "analyst",
            Utc::now(),
        )
        .with_url("https://example.org/post/1");

        let v: serde_json::Value = serde_json::to_value(&item).unwrap();
        assert_eq!(v["source"], serde_json::json!("channel"));
        assert_eq!(v["content_type"], serde_json::json!("post"));
        assert_eq!(v["processed"], serde_json::json!(false));
        assert_eq!(v["metadata"]["sentiment"], serde_json::json!("neutral"));
        assert_eq!(v["metadata"]["importance"], serde_json::json!("low"));
        // Unprocessed items omit insights entirely.
        assert!(v.get("insights").is_none());
    }

    #[test]
    fn insight_counts_default_to_zero() {
        let item = ContentItem::new(
            "c-2",
            SourceTag::Social,
            ContentType::Tweet,
            "gm",
            "anon",
            Utc::now(),
        );
        assert_eq!(item.prediction_count(), 0);
        assert_eq!(item.market_signal_count(), 0);
    }
}
