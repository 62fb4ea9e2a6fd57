//! # Signal Extractor
//! Stateless analysis of one content item into tags and insight lists.
//!
//! Five independent keyword-presence scans run against the lower-cased text:
//! predictions, action items, technical signals, asset mentions, and
//! sentiment (bullish vs. bearish majority; tie → neutral). Importance words
//! force `importance = high`; otherwise importance is `medium` when any
//! prediction/action insight was found, else `low`. Presence/absence only,
//! no numeric weighting.
//!
//! `analyze` never fails the pipeline: on an internal error the item comes
//! back unmodified with `processed = false` and the cause is logged, so the
//! caller can tell analyzed from merely-stored content.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::content::{ContentInsights, ContentItem, Importance, Sentiment};

/// Keyword taxonomy, embedded at compile time (editable without code changes).
#[derive(Debug, Clone, Deserialize)]
struct Taxonomy {
    prediction: Vec<String>,
    action: Vec<String>,
    technical: Vec<String>,
    bullish: Vec<String>,
    bearish: Vec<String>,
    importance: Vec<String>,
    /// Canonical asset id → ticker/alias list.
    assets: BTreeMap<String, Vec<String>>,
}

static TAXONOMY: Lazy<Taxonomy> = Lazy::new(|| {
    let raw = include_str!("../signal_taxonomy.json");
    serde_json::from_str::<Taxonomy>(raw).expect("valid signal taxonomy")
});

#[derive(Debug, Clone)]
pub struct SignalExtractor;

impl SignalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one item. Infallible from the caller's perspective: internal
    /// errors leave the item unprocessed and are logged with the item id.
    pub fn analyze(&self, item: ContentItem) -> ContentItem {
        match self.analyze_inner(&item) {
            Ok(analyzed) => analyzed,
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = ?e, "signal extraction failed; storing unprocessed");
                item
            }
        }
    }

    fn analyze_inner(&self, item: &ContentItem) -> anyhow::Result<ContentItem> {
        let text = item.text.to_lowercase();
        let tokens: HashSet<String> = tokenize(&text).collect();
        let tax = &*TAXONOMY;

        let mut insights = ContentInsights::default();

        for word in &tax.prediction {
            if text.contains(word.as_str()) {
                insights
                    .predictions
                    .push(format!("prediction keyword: {word}"));
            }
        }
        for word in &tax.action {
            if text.contains(word.as_str()) {
                insights.action_items.push(format!("action keyword: {word}"));
            }
        }
        for word in &tax.technical {
            if text.contains(word.as_str()) {
                insights
                    .market_signals
                    .push(format!("technical signal: {word}"));
            }
        }

        let mut mentioned = Vec::new();
        for (asset, aliases) in &tax.assets {
            if aliases.iter().any(|a| alias_present(&text, &tokens, a)) {
                mentioned.push(asset.clone());
            }
        }

        let bull = tax
            .bullish
            .iter()
            .filter(|w| text.contains(w.as_str()))
            .count();
        let bear = tax
            .bearish
            .iter()
            .filter(|w| text.contains(w.as_str()))
            .count();
        let sentiment = match bull.cmp(&bear) {
            std::cmp::Ordering::Greater => Sentiment::Bullish,
            std::cmp::Ordering::Less => Sentiment::Bearish,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };

        // Importance words win regardless of other signals.
        let importance = if tax.importance.iter().any(|w| text.contains(w.as_str())) {
            Importance::High
        } else if !insights.predictions.is_empty() || !insights.action_items.is_empty() {
            Importance::Medium
        } else {
            Importance::Low
        };

        let mut out = item.clone();
        out.metadata.sentiment = sentiment;
        out.metadata.importance = importance;
        out.metadata.mentioned_assets = mentioned;
        out.insights = Some(insights);
        out.processed = true;
        Ok(out)
    }
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Alphanumeric lower-case tokens.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// Short tickers match whole tokens only ("sol" must not match "solution");
/// longer aliases and phrases use plain substring matching.
fn alias_present(text: &str, tokens: &HashSet<String>, alias: &str) -> bool {
    if alias.len() <= 4 && !alias.contains(' ') {
        tokens.contains(alias)
    } else {
        text.contains(alias)
    }
}
