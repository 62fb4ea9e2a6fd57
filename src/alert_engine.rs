//! # Alert Criteria Engine
//! Pure, testable logic that maps `(item, criteria)` → opportunity alerts.
//! No I/O and no side effects; persistence is the alert store's job.
//!
//! For every enabled criterion, six signal categories are checked
//! independently (asset mention, keyword match, importance, sentiment,
//! extracted prediction, extracted market signal). A criterion fires when at
//! least `min_confluence` categories match.

use chrono::{DateTime, Utc};

use crate::alert::{AlertContext, AlertUrgency, OpportunityAlert};
use crate::content::ContentItem;
use crate::criteria::{AlertCriteria, Priority};

/// Evaluate one item against all given criteria, in criteria order.
/// Disabled criteria are skipped; each match yields exactly one alert.
pub fn evaluate(
    item: &ContentItem,
    criteria: &[AlertCriteria],
    now: DateTime<Utc>,
) -> Vec<OpportunityAlert> {
    criteria
        .iter()
        .filter(|c| c.enabled)
        .filter_map(|c| evaluate_one(item, c, now))
        .collect()
}

/// Evaluate a single criterion. Returns `None` below the confluence bar.
pub fn evaluate_one(
    item: &ContentItem,
    criteria: &AlertCriteria,
    now: DateTime<Utc>,
) -> Option<OpportunityAlert> {
    let signals = matched_signals(item, criteria);
    if signals.len() < criteria.conditions.min_confluence {
        return None;
    }

    let urgency = urgency_for(criteria.priority);
    let confidence = confidence(signals.len(), criteria.priority);
    let asset = pick_asset(item, criteria);

    Some(OpportunityAlert {
        id: format!("alert-{}-{}", criteria.id, item.id),
        criteria_id: criteria.id.clone(),
        urgency,
        asset,
        signal: format!("{}: {} confluent signals", criteria.name, signals.len()),
        confidence,
        timeframe: timeframe_for(urgency).to_string(),
        recommended_action: action_for(urgency).to_string(),
        reasons: signals.clone(),
        triggered_at: now,
        price_targets: None,
        context: AlertContext {
            current_price: None,
            current_volume: None,
            sentiment: Some(item.metadata.sentiment),
            catalysts: signals,
        },
    })
}

/// The set of matched signal category descriptions. Each category
/// contributes at most one entry, so `len()` is the confluence count.
pub fn matched_signals(item: &ContentItem, criteria: &AlertCriteria) -> Vec<String> {
    let mut signals = Vec::new();
    let text = item.text.to_lowercase();
    let cond = &criteria.conditions;

    // (1) Asset intersection.
    let matched_assets: Vec<&String> = cond
        .assets
        .iter()
        .filter(|a| {
            item.metadata
                .mentioned_assets
                .iter()
                .any(|m| m.eq_ignore_ascii_case(a))
        })
        .collect();
    if !matched_assets.is_empty() {
        let names: Vec<&str> = matched_assets.iter().map(|s| s.as_str()).collect();
        signals.push(format!("asset mention: {}", names.join(", ")));
    }

    // (2) Keyword intersection against the lower-cased text.
    let matched_keywords: Vec<&String> = cond
        .keywords
        .iter()
        .filter(|k| text.contains(k.to_lowercase().as_str()))
        .collect();
    if !matched_keywords.is_empty() {
        let names: Vec<&str> = matched_keywords.iter().map(|s| s.as_str()).collect();
        signals.push(format!("keyword match: {}", names.join(", ")));
    }

    // (3) Required importance.
    if let Some(imp) = cond.required_importance {
        if item.metadata.importance == imp {
            signals.push(format!("importance: {imp:?}").to_lowercase());
        }
    }

    // (4) Required sentiment.
    if let Some(sent) = cond.required_sentiment {
        if item.metadata.sentiment == sent {
            signals.push(format!("sentiment: {sent:?}").to_lowercase());
        }
    }

    // (5) At least one extracted prediction.
    if item.prediction_count() > 0 {
        signals.push("contains prediction".to_string());
    }

    // (6) At least one extracted market signal.
    if item.market_signal_count() > 0 {
        signals.push("contains market signal".to_string());
    }

    signals
}

/// Deterministic priority → urgency mapping.
pub fn urgency_for(priority: Priority) -> AlertUrgency {
    match priority {
        Priority::High => AlertUrgency::Immediate,
        Priority::Medium => AlertUrgency::Upcoming,
        Priority::Low => AlertUrgency::Watchlist,
    }
}

/// Design contract, reproduced exactly by tests:
/// `confidence = clamp(0.5 + min(0.15 * n, 0.4) + (high ? 0.1 : 0.05), 0, 0.95)`
pub fn confidence(signal_count: usize, priority: Priority) -> f64 {
    let base = 0.5 + (0.15 * signal_count as f64).min(0.4);
    let bonus = if priority == Priority::High { 0.1 } else { 0.05 };
    (base + bonus).clamp(0.0, 0.95)
}

fn pick_asset(item: &ContentItem, criteria: &AlertCriteria) -> String {
    criteria
        .conditions
        .assets
        .iter()
        .find(|a| {
            item.metadata
                .mentioned_assets
                .iter()
                .any(|m| m.eq_ignore_ascii_case(a))
        })
        .or_else(|| criteria.conditions.assets.first())
        .or_else(|| item.metadata.mentioned_assets.first())
        .cloned()
        .unwrap_or_else(|| "market".to_string())
}

fn timeframe_for(urgency: AlertUrgency) -> &'static str {
    match urgency {
        AlertUrgency::Immediate => "1 week",
        AlertUrgency::Upcoming => "1 month",
        AlertUrgency::Watchlist => "3 months",
    }
}

fn action_for(urgency: AlertUrgency) -> &'static str {
    match urgency {
        AlertUrgency::Immediate => "review and consider entry",
        AlertUrgency::Upcoming => "monitor closely",
        AlertUrgency::Watchlist => "add to watchlist",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentType, Importance, Sentiment, SourceTag};
    use crate::criteria::{CriteriaActions, CriteriaConditions};

    fn item_with(assets: Vec<&str>, text: &str, importance: Importance) -> ContentItem {
        let mut it = ContentItem::new(
            "i-1",
            SourceTag::Channel,
            ContentType::Post,
            text,
            "tester",
            Utc::now(),
        );
        it.metadata.mentioned_assets = assets.into_iter().map(String::from).collect();
        it.metadata.importance = importance;
        it
    }

    fn crit(priority: Priority, min_confluence: usize) -> AlertCriteria {
        AlertCriteria {
            id: "c-1".into(),
            name: "Test criterion".into(),
            description: String::new(),
            enabled: true,
            priority,
            conditions: CriteriaConditions {
                assets: vec!["bitcoin".into()],
                keywords: vec!["institutional".into(), "treasury".into(), "reserve".into()],
                required_importance: Some(Importance::High),
                required_sentiment: None,
                min_confluence,
            },
            actions: CriteriaActions::default(),
        }
    }

    #[test]
    fn confidence_stays_within_bounds_for_all_counts() {
        for n in 0..20 {
            for p in [Priority::Low, Priority::Medium, Priority::High] {
                let c = confidence(n, p);
                assert!((0.5..=0.95).contains(&c), "n={n} p={p:?} c={c}");
            }
        }
    }

    #[test]
    fn below_confluence_yields_nothing() {
        // Matches asset only (1 category) against min_confluence = 2.
        let item = item_with(vec!["bitcoin"], "nothing relevant here", Importance::Low);
        assert!(evaluate_one(&item, &crit(Priority::High, 2), Utc::now()).is_none());
    }

    #[test]
    fn confluence_fire_scenario() {
        // Asset + keywords + importance = 3 categories; min_confluence = 2.
        let item = item_with(
            vec!["bitcoin"],
            "Major institutional treasury adds bitcoin reserve",
            Importance::High,
        );
        let alerts = evaluate(&item, &[crit(Priority::High, 2)], Utc::now());
        assert_eq!(alerts.len(), 1);
        let a = &alerts[0];
        assert_eq!(a.urgency, AlertUrgency::Immediate);
        assert_eq!(a.asset, "bitcoin");
        assert_eq!(a.reasons.len(), 3);
        // 0.5 + min(0.15*3, 0.4) + 0.1 = 1.0, clamped to 0.95.
        assert!((a.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn urgency_mapping_is_total_and_fixed() {
        assert_eq!(urgency_for(Priority::High), AlertUrgency::Immediate);
        assert_eq!(urgency_for(Priority::Medium), AlertUrgency::Upcoming);
        assert_eq!(urgency_for(Priority::Low), AlertUrgency::Watchlist);
    }

    #[test]
    fn disabled_criteria_are_skipped() {
        let item = item_with(
            vec!["bitcoin"],
            "institutional treasury reserve",
            Importance::High,
        );
        let mut c = crit(Priority::High, 1);
        c.enabled = false;
        assert!(evaluate(&item, &[c], Utc::now()).is_empty());
    }

    #[test]
    fn sentiment_category_counts_once() {
        let mut c = crit(Priority::Medium, 1);
        c.conditions.required_sentiment = Some(Sentiment::Bullish);
        let mut item = item_with(vec![], "no keywords", Importance::Low);
        item.metadata.sentiment = Sentiment::Bullish;
        let a = evaluate_one(&item, &c, Utc::now()).expect("sentiment alone matches");
        assert_eq!(a.reasons, vec!["sentiment: bullish".to_string()]);
        assert_eq!(a.urgency, AlertUrgency::Upcoming);
        // 0.5 + 0.15 + 0.05
        assert!((a.confidence - 0.70).abs() < 1e-9);
    }
}
