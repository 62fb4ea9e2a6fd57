//! # Alert Store & Lifecycle Manager
//!
//! Holds active and historical `OpportunityAlert`s. Alerts join both lists
//! when recorded; the periodic sweep drops them from the active set (never
//! from history) once they are older than the staleness window.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Mutex};

use crate::content::Sentiment;

/// Active alerts go stale after this long.
pub const ALERT_STALENESS_HOURS: i64 = 24;

/// Urgency tier, derived deterministically from the triggering criterion's
/// priority: high → immediate, medium → upcoming, low → watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertUrgency {
    Immediate,
    Upcoming,
    Watchlist,
}

impl AlertUrgency {
    pub fn label(self) -> &'static str {
        match self {
            AlertUrgency::Immediate => "immediate",
            AlertUrgency::Upcoming => "upcoming",
            AlertUrgency::Watchlist => "watchlist",
        }
    }
}

/// Optional entry/target/stop triple attached by report generators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTargets {
    pub entry: f64,
    pub target: f64,
    pub stop: f64,
}

/// Market context snapshot at trigger time. Catalysts are the matched signal
/// strings; human-readable prose is the delivery layer's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalysts: Vec<String>,
}

/// Output of a criteria match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityAlert {
    pub id: String,
    /// Id of the criterion that fired; every alert references exactly one.
    pub criteria_id: String,
    pub urgency: AlertUrgency,
    pub asset: String,
    pub signal: String,
    /// Confidence in [0, 0.95].
    pub confidence: f64,
    pub timeframe: String,
    pub recommended_action: String,
    /// Matched signal descriptions, kept as plain data.
    pub reasons: Vec<String>,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_targets: Option<PriceTargets>,
    pub context: AlertContext,
}

/// Delivery-ready aggregate counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertMetrics {
    pub total_alerts: usize,
    pub by_type: HashMap<String, usize>,
    pub by_asset: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Inner {
    active: Vec<OpportunityAlert>,
    history: Vec<OpportunityAlert>,
}

/// Thread-safe alert ledger. A single mutex guards both lists, so `sweep`
/// is idempotent and safe to call concurrently with `record`.
#[derive(Debug, Default)]
pub struct AlertStore {
    inner: Mutex<Inner>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, alert: OpportunityAlert) {
        counter!("alerts_recorded_total").increment(1);
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        inner.active.push(alert.clone());
        inner.history.push(alert);
    }

    pub fn active(&self) -> Vec<OpportunityAlert> {
        self.inner
            .lock()
            .expect("alert store mutex poisoned")
            .active
            .clone()
    }

    /// Most-recent-first slice of history.
    pub fn history(&self, limit: usize) -> Vec<OpportunityAlert> {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        inner
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> AlertMetrics {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        let mut m = AlertMetrics {
            total_alerts: inner.history.len(),
            ..Default::default()
        };
        for a in &inner.history {
            *m.by_type.entry(a.urgency.label().to_string()).or_default() += 1;
            *m.by_asset.entry(a.asset.clone()).or_default() += 1;
        }
        m
    }

    /// Drop stale alerts from the active set; history is untouched.
    /// Returns how many were expired this call.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(ALERT_STALENESS_HOURS);
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        let before = inner.active.len();
        inner.active.retain(|a| a.triggered_at >= cutoff);
        let removed = before - inner.active.len();
        if removed > 0 {
            counter!("alerts_expired_total").increment(removed as u64);
        }
        removed
    }
}
