//! # Prediction Tracker
//!
//! Converts triggered alerts and extracted content insights into trackable
//! predictions with an expiry horizon, evaluates them when they expire (or
//! earlier, when a completion signal says so), and rolls accuracy and
//! profitability up by asset, timeframe, and source.
//!
//! Scoring an expired prediction is delegated to an injected
//! [`OutcomeEvaluator`] strategy; the tracker itself never invents accuracy
//! values. A prediction transitions `active → expired|completed` exactly
//! once, and exactly one outcome exists for it afterwards.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, sync::Mutex};

use crate::alert::OpportunityAlert;

/// Fallback horizon for unrecognized timeframe labels.
const DEFAULT_HORIZON_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Active,
    Expired,
    Completed,
}

/// A trackable forward-looking claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub asset: String,
    pub text: String,
    pub confidence: f64,
    pub timeframe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalysts: Vec<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PredictionStatus,
}

/// The one-time evaluation of exactly one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub prediction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_price: Option<f64>,
    pub actual_outcome: String,
    /// Accuracy in [0, 1].
    pub accuracy: f64,
    /// Signed percentage return, when price data allowed computing one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profitability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_to_realization: Option<i64>,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// Pluggable scoring strategy. Production wires a market-data-backed
/// evaluator; tests inject a deterministic fake.
#[async_trait]
pub trait OutcomeEvaluator: Send + Sync {
    async fn evaluate(&self, prediction: &Prediction, now: DateTime<Utc>)
        -> Result<PredictionOutcome>;
}

/// Optional collaborator that can mark a prediction as realized early.
#[async_trait]
pub trait CompletionSignal: Send + Sync {
    async fn is_complete(&self, prediction: &Prediction) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitabilitySummary {
    pub total_return: f64,
    /// Fraction of outcomes with positive profitability.
    pub win_rate: f64,
    pub average_gain: f64,
    /// Mean of losing returns (a negative number, 0.0 with no losers).
    pub average_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingAccuracy {
    pub last_7_days: f64,
    pub last_30_days: f64,
    pub last_90_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_predictions: usize,
    pub active: usize,
    pub evaluated: usize,
    /// Mean accuracy over all outcomes.
    pub overall_accuracy: f64,
    pub accuracy_by_asset: HashMap<String, f64>,
    pub accuracy_by_timeframe: HashMap<String, f64>,
    pub accuracy_by_source: HashMap<String, f64>,
    pub profitability: ProfitabilitySummary,
    pub recent: RollingAccuracy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub period_days: i64,
    pub outcomes_in_period: usize,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Default)]
struct Inner {
    predictions: Vec<Prediction>,
    outcomes: Vec<PredictionOutcome>,
    seq: u64,
}

pub struct PredictionTracker {
    inner: Mutex<Inner>,
    evaluator: Arc<dyn OutcomeEvaluator>,
    completion: Option<Arc<dyn CompletionSignal>>,
}

impl PredictionTracker {
    pub fn new(evaluator: Arc<dyn OutcomeEvaluator>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            evaluator,
            completion: None,
        }
    }

    pub fn with_completion_signal(mut self, signal: Arc<dyn CompletionSignal>) -> Self {
        self.completion = Some(signal);
        self
    }

    /// Track a prediction extracted from content insights.
    #[allow(clippy::too_many_arguments)]
    pub fn track(
        &self,
        asset: impl Into<String>,
        text: impl Into<String>,
        confidence: f64,
        timeframe: impl Into<String>,
        predicted_price: Option<f64>,
        catalysts: Vec<String>,
        source: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Prediction {
        let timeframe = timeframe.into();
        let mut inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        inner.seq += 1;
        let prediction = Prediction {
            id: format!("pred-{}", inner.seq),
            asset: asset.into(),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            expires_at: now + horizon_for(&timeframe),
            timeframe,
            predicted_price,
            price_range: None,
            catalysts,
            source: source.into(),
            created_at: now,
            status: PredictionStatus::Active,
        };
        inner.predictions.push(prediction.clone());
        counter!("predictions_tracked_total").increment(1);
        prediction
    }

    /// Mirror a triggered alert as a prediction: asset, confidence,
    /// timeframe, and catalysts are copied; the source labels the alert's
    /// origin criterion.
    pub fn track_from_alert(&self, alert: &OpportunityAlert, now: DateTime<Utc>) -> Prediction {
        self.track(
            alert.asset.clone(),
            alert.signal.clone(),
            alert.confidence,
            alert.timeframe.clone(),
            alert.price_targets.map(|p| p.target),
            alert.context.catalysts.clone(),
            format!("alert:{}", alert.criteria_id),
            now,
        )
    }

    /// Evaluation sweep. Expired actives get an outcome and flip to
    /// `expired`; actives with an early-completion signal flip to
    /// `completed` instead. Returns how many outcomes were produced.
    pub async fn evaluate_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Prediction> = {
            let inner = self.inner.lock().expect("prediction tracker mutex poisoned");
            inner
                .predictions
                .iter()
                .filter(|p| p.status == PredictionStatus::Active)
                .cloned()
                .collect()
        };

        let mut produced = 0;
        for prediction in due {
            let completed_early = match &self.completion {
                Some(sig) => sig.is_complete(&prediction).await,
                None => false,
            };
            if !completed_early && prediction.expires_at > now {
                continue;
            }

            let outcome = match self.evaluator.evaluate(&prediction, now).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(
                        prediction_id = %prediction.id,
                        error = %e,
                        "outcome evaluation failed; prediction stays active"
                    );
                    continue;
                }
            };

            let terminal = if completed_early {
                PredictionStatus::Completed
            } else {
                PredictionStatus::Expired
            };
            self.finalize(&prediction.id, terminal, outcome);
            produced += 1;
        }
        produced
    }

    /// Flip to a terminal status and write the single outcome. Guarded
    /// against double-finalization: a non-active prediction is left alone.
    fn finalize(&self, id: &str, status: PredictionStatus, outcome: PredictionOutcome) {
        let mut inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        let Some(p) = inner.predictions.iter_mut().find(|p| p.id == id) else {
            return;
        };
        if p.status != PredictionStatus::Active {
            return;
        }
        p.status = status;
        inner.outcomes.push(outcome);
        counter!("predictions_evaluated_total").increment(1);
    }

    pub fn predictions(&self, status: Option<PredictionStatus>) -> Vec<Prediction> {
        let inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        inner
            .predictions
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect()
    }

    /// Most-recent-first outcomes.
    pub fn outcomes(&self, limit: usize) -> Vec<PredictionOutcome> {
        let inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        inner.outcomes.iter().rev().take(limit).cloned().collect()
    }

    /// Full rollup over everything ever evaluated.
    pub fn performance_metrics(&self, now: DateTime<Utc>) -> PerformanceMetrics {
        let inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        compute_metrics(&inner.predictions, &inner.outcomes, now)
    }

    /// Rollup restricted to outcomes evaluated within the last `days`.
    pub fn performance_report(&self, days: i64, now: DateTime<Utc>) -> PerformanceReport {
        let inner = self.inner.lock().expect("prediction tracker mutex poisoned");
        let cutoff = now - Duration::days(days.max(1));
        let window: Vec<PredictionOutcome> = inner
            .outcomes
            .iter()
            .filter(|o| o.evaluated_at >= cutoff)
            .cloned()
            .collect();
        PerformanceReport {
            generated_at: now,
            period_days: days.max(1),
            outcomes_in_period: window.len(),
            metrics: compute_metrics(&inner.predictions, &window, now),
        }
    }
}

/// Expiry horizon from the timeframe label; unrecognized labels get the
/// 3-month default.
pub fn horizon_for(timeframe: &str) -> Duration {
    match timeframe.trim().to_lowercase().as_str() {
        "1 day" => Duration::days(1),
        "1 week" => Duration::days(7),
        "1 month" => Duration::days(30),
        "3 months" => Duration::days(90),
        "6 months" => Duration::days(180),
        "1 year" => Duration::days(365),
        _ => Duration::days(DEFAULT_HORIZON_DAYS),
    }
}

fn compute_metrics(
    predictions: &[Prediction],
    outcomes: &[PredictionOutcome],
    now: DateTime<Utc>,
) -> PerformanceMetrics {
    let by_id: HashMap<&str, &Prediction> =
        predictions.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut by_asset: HashMap<String, Vec<f64>> = HashMap::new();
    let mut by_timeframe: HashMap<String, Vec<f64>> = HashMap::new();
    let mut by_source: HashMap<String, Vec<f64>> = HashMap::new();

    let mut gains = Vec::new();
    let mut losses = Vec::new();
    let mut total_return = 0.0;
    let mut with_profit = 0usize;

    for o in outcomes {
        if let Some(p) = by_id.get(o.prediction_id.as_str()) {
            by_asset.entry(p.asset.clone()).or_default().push(o.accuracy);
            by_timeframe
                .entry(p.timeframe.clone())
                .or_default()
                .push(o.accuracy);
            by_source
                .entry(p.source.clone())
                .or_default()
                .push(o.accuracy);
        }
        if let Some(profit) = o.profitability {
            with_profit += 1;
            total_return += profit;
            if profit > 0.0 {
                gains.push(profit);
            } else {
                losses.push(profit);
            }
        }
    }

    let window_mean = |days: i64| {
        let cutoff = now - Duration::days(days);
        mean(
            outcomes
                .iter()
                .filter(|o| o.evaluated_at >= cutoff)
                .map(|o| o.accuracy),
        )
    };

    PerformanceMetrics {
        total_predictions: predictions.len(),
        active: predictions
            .iter()
            .filter(|p| p.status == PredictionStatus::Active)
            .count(),
        evaluated: outcomes.len(),
        overall_accuracy: mean(outcomes.iter().map(|o| o.accuracy)),
        accuracy_by_asset: mean_map(by_asset),
        accuracy_by_timeframe: mean_map(by_timeframe),
        accuracy_by_source: mean_map(by_source),
        profitability: ProfitabilitySummary {
            total_return,
            win_rate: if with_profit > 0 {
                gains.len() as f64 / with_profit as f64
            } else {
                0.0
            },
            average_gain: mean(gains.iter().copied()),
            average_loss: mean(losses.iter().copied()),
        },
        recent: RollingAccuracy {
            last_7_days: window_mean(7),
            last_30_days: window_mean(30),
            last_90_days: window_mean(90),
        },
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

fn mean_map(groups: HashMap<String, Vec<f64>>) -> HashMap<String, f64> {
    groups
        .into_iter()
        .map(|(k, v)| {
            let m = mean(v.iter().copied());
            (k, m)
        })
        .collect()
}
