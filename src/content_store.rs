//! # Content Store
//! In-memory, append-only ledger of ingested items, queryable by
//! source/type/time/importance/assets, with a short-lived query cache and a
//! time-bounded retention policy.
//!
//! Cache contract: a hit returns byte-identical results to a fresh query over
//! the same underlying data. Every mutation therefore clears the cache, and
//! entries past their TTL are evicted whenever a fresh result is inserted, so
//! one-off filter keys (digest/briefing time windows) cannot accumulate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration as StdDuration, Instant},
};

use crate::content::{ContentItem, ContentType, Importance, SourceTag};

/// Cached query results live this long at most.
pub const QUERY_CACHE_TTL: StdDuration = StdDuration::from_secs(600);

/// Items older than this many days are eligible for removal.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Filter set for `query`. All populated fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    /// Match when the item mentions at least one of these assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<String>>,
}

/// Aggregated view over a time range, used by digest/briefing builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSummary {
    pub total: usize,
    pub by_source: HashMap<String, usize>,
    pub by_importance: HashMap<String, usize>,
    /// Up to 5 most recent extracted predictions.
    pub top_predictions: Vec<String>,
    /// Up to 5 most recent extracted market signals.
    pub top_signals: Vec<String>,
    /// Up to 10 unique mentioned assets.
    pub mentioned_assets: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    items: Vec<ContentItem>,
    cache: HashMap<String, (Instant, Vec<ContentItem>)>,
}

/// Thread-safe in-memory content ledger.
#[derive(Debug)]
pub struct ContentStore {
    inner: Mutex<Inner>,
    retention: Duration,
    cache_ttl: StdDuration,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::with_retention_days(DEFAULT_RETENTION_DAYS)
    }

    pub fn with_retention_days(days: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                cache: HashMap::new(),
            }),
            retention: Duration::days(days),
            cache_ttl: QUERY_CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_cache_ttl(cache_ttl: StdDuration) -> Self {
        let mut store = Self::new();
        store.cache_ttl = cache_ttl;
        store
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.inner
            .lock()
            .expect("content store mutex poisoned")
            .cache
            .len()
    }

    /// Append a batch of items. Clears the query cache.
    pub fn store(&self, items: Vec<ContentItem>) {
        if items.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("content store mutex poisoned");
        inner.items.extend(items);
        inner.cache.clear();
    }

    /// Replace a stored item by id (used once, when the extractor finishes).
    pub fn update(&self, item: ContentItem) {
        let mut inner = self.inner.lock().expect("content store mutex poisoned");
        if let Some(slot) = inner.items.iter_mut().find(|i| i.id == item.id) {
            *slot = item;
            inner.cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("content store mutex poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filtered query with a 10-minute result cache keyed by the filter set.
    pub fn query(&self, filter: &ContentFilter) -> Vec<ContentItem> {
        let key = cache_key(filter);
        let ttl = self.cache_ttl;
        let mut inner = self.inner.lock().expect("content store mutex poisoned");

        if let Some((at, cached)) = inner.cache.get(&key) {
            if at.elapsed() <= ttl {
                return cached.clone();
            }
        }

        let results: Vec<ContentItem> = inner
            .items
            .iter()
            .filter(|i| matches_filter(i, filter))
            .cloned()
            .collect();
        // Evict dead entries before inserting so the map stays bounded even
        // when nothing else mutates the store between queries.
        inner.cache.retain(|_, (at, _)| at.elapsed() <= ttl);
        inner.cache.insert(key, (Instant::now(), results.clone()));
        results
    }

    /// Aggregate items within `[since, until]` into a summary.
    pub fn summarize(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> ContentSummary {
        let filter = ContentFilter {
            since: Some(since),
            until: Some(until),
            ..Default::default()
        };
        let mut items = self.query(&filter);
        // Most recent first so "top" lists favor fresh insights.
        items.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));

        let mut by_source: HashMap<String, usize> = HashMap::new();
        let mut by_importance: HashMap<String, usize> = HashMap::new();
        let mut top_predictions = Vec::new();
        let mut top_signals = Vec::new();
        let mut assets = Vec::new();

        for item in &items {
            *by_source.entry(tag_label(item.source)).or_default() += 1;
            *by_importance
                .entry(importance_label(item.metadata.importance))
                .or_default() += 1;

            if let Some(ins) = &item.insights {
                for p in &ins.predictions {
                    if top_predictions.len() < 5 {
                        top_predictions.push(p.clone());
                    }
                }
                for s in &ins.market_signals {
                    if top_signals.len() < 5 {
                        top_signals.push(s.clone());
                    }
                }
            }
            for a in &item.metadata.mentioned_assets {
                if !assets.contains(a) && assets.len() < 10 {
                    assets.push(a.clone());
                }
            }
        }

        ContentSummary {
            total: items.len(),
            by_source,
            by_importance,
            top_predictions,
            top_signals,
            mentioned_assets: assets,
        }
    }

    /// Housekeeping: drop items older than the retention horizon.
    /// Removal is lazy; callers invoke this from a periodic job.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut inner = self.inner.lock().expect("content store mutex poisoned");
        let before = inner.items.len();
        inner.items.retain(|i| i.metadata.timestamp >= cutoff);
        let removed = before - inner.items.len();
        if removed > 0 {
            inner.cache.clear();
        }
        removed
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(item: &ContentItem, f: &ContentFilter) -> bool {
    if let Some(src) = f.source {
        if item.source != src {
            return false;
        }
    }
    if let Some(ct) = f.content_type {
        if item.content_type != ct {
            return false;
        }
    }
    if let Some(since) = f.since {
        if item.metadata.timestamp < since {
            return false;
        }
    }
    if let Some(until) = f.until {
        if item.metadata.timestamp > until {
            return false;
        }
    }
    if let Some(imp) = f.importance {
        if item.metadata.importance != imp {
            return false;
        }
    }
    if let Some(assets) = &f.assets {
        let hit = item
            .metadata
            .mentioned_assets
            .iter()
            .any(|a| assets.iter().any(|b| a.eq_ignore_ascii_case(b)));
        if !hit {
            return false;
        }
    }
    true
}

fn cache_key(filter: &ContentFilter) -> String {
    let raw = serde_json::to_vec(filter).unwrap_or_default();
    let digest = Sha256::digest(&raw);
    format!("{digest:x}")
}

fn tag_label(tag: SourceTag) -> String {
    match tag {
        SourceTag::Channel => "channel",
        SourceTag::Social => "social",
        SourceTag::Research => "research",
        SourceTag::Feed => "feed",
    }
    .to_string()
}

fn importance_label(imp: Importance) -> String {
    match imp {
        Importance::High => "high",
        Importance::Medium => "medium",
        Importance::Low => "low",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentType;
    use chrono::Duration;

    fn item(id: &str, text: &str, age_days: i64) -> ContentItem {
        ContentItem::new(
            id,
            SourceTag::Channel,
            ContentType::Post,
            text,
            "tester",
            Utc::now() - Duration::days(age_days),
        )
    }

    #[test]
    fn query_filters_by_source_and_time() {
        let store = ContentStore::new();
        let mut social = item("s-1", "tweet", 0);
        social.source = SourceTag::Social;
        store.store(vec![item("c-1", "old post", 10), social]);

        let only_social = store.query(&ContentFilter {
            source: Some(SourceTag::Social),
            ..Default::default()
        });
        assert_eq!(only_social.len(), 1);
        assert_eq!(only_social[0].id, "s-1");

        let recent = store.query(&ContentFilter {
            since: Some(Utc::now() - Duration::days(1)),
            ..Default::default()
        });
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn cache_is_cleared_on_store() {
        let store = ContentStore::new();
        store.store(vec![item("a", "one", 0)]);
        let f = ContentFilter::default();
        assert_eq!(store.query(&f).len(), 1);

        // New data must be visible immediately even with a warm cache.
        store.store(vec![item("b", "two", 0)]);
        assert_eq!(store.query(&f).len(), 2);
    }

    #[test]
    fn stale_cache_entries_are_evicted_on_insert() {
        let store = ContentStore::with_cache_ttl(StdDuration::ZERO);
        store.store(vec![item("a", "one", 0)]);

        store.query(&ContentFilter {
            source: Some(SourceTag::Channel),
            ..Default::default()
        });
        assert_eq!(store.cache_len(), 1);

        // With a zero TTL the first entry is already stale; inserting the
        // second result must drop it rather than let the map grow.
        std::thread::sleep(StdDuration::from_millis(5));
        store.query(&ContentFilter::default());
        assert_eq!(store.cache_len(), 1);
    }

    #[test]
    fn retention_sweep_drops_old_items() {
        let store = ContentStore::with_retention_days(30);
        store.store(vec![item("old", "ancient", 45), item("new", "fresh", 1)]);
        let removed = store.sweep_expired(Utc::now());
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        // Idempotent.
        assert_eq!(store.sweep_expired(Utc::now()), 0);
    }

    #[test]
    fn summary_caps_lists() {
        let store = ContentStore::new();
        let mut items = Vec::new();
        for i in 0..8 {
            let mut it = item(&format!("p-{i}"), "x", 0);
            it.insights = Some(crate::content::ContentInsights {
                predictions: vec![format!("prediction {i}")],
                market_signals: vec![format!("signal {i}")],
                ..Default::default()
            });
            it.metadata.mentioned_assets = vec![format!("asset-{i}")];
            items.push(it);
        }
        store.store(items);
        let s = store.summarize(Utc::now() - Duration::days(1), Utc::now());
        assert_eq!(s.total, 8);
        assert_eq!(s.top_predictions.len(), 5);
        assert_eq!(s.top_signals.len(), 5);
        assert_eq!(s.mentioned_assets.len(), 8);
    }
}
