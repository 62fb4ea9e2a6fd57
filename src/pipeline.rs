//! # Intelligence Core
//!
//! The orchestration facade: content flows in from providers, gets tagged by
//! the extractor, lands in the content store, is evaluated against every
//! enabled criterion, and matching rules produce alerts that the prediction
//! tracker mirrors. The scheduler invokes the job bodies defined here;
//! briefing/digest/report builders read from the stores and produce a
//! structured processed-intelligence bundle for the delivery sinks.
//!
//! Collaborators (content providers, market data, delivery, outcome
//! evaluation) are injected at construction; a missing optional collaborator
//! degrades the affected feature instead of failing at runtime.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Duration;
use metrics::counter;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::alert::{AlertMetrics, AlertStore, AlertUrgency, OpportunityAlert};
use crate::alert_engine;
use crate::content_store::{ContentStore, ContentSummary};
use crate::criteria::CriteriaRegistry;
use crate::extract::SignalExtractor;
use crate::market::{MarketDataProvider, MarketSnapshot};
use crate::notify::DeliveryMux;
use crate::predict::{
    OutcomeEvaluator, PerformanceMetrics, PerformanceReport, Prediction, PredictionOutcome,
    PredictionStatus, PredictionTracker,
};
use crate::schedule::{
    Clock, JobRunner, ScheduleConfig, ScheduleConfigPatch, ScheduledTask, SchedulerMetrics,
    SystemClock, TaskScheduler, TaskType,
};
use crate::sources::{poll_once, ContentProvider, DEFAULT_DEDUP_WINDOW_SECS};

/// How often the tracker's evaluation sweep runs.
const EVALUATION_SWEEP_SECS: u64 = 3600;

/// Market-pulse block of a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketPulse {
    pub items_analyzed: usize,
    pub assets_in_focus: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<MarketSnapshot>,
}

/// Processed-intelligence bundle handed to delivery sinks and manual
/// triggers. Shape: id, kind, date, market pulse, knowledge digest,
/// opportunities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceBundle {
    pub id: String,
    pub kind: String,
    /// ISO date (UTC) the bundle covers.
    pub date: String,
    pub market_pulse: MarketPulse,
    pub knowledge_digest: ContentSummary,
    pub opportunities: Vec<OpportunityAlert>,
}

pub struct IntelligenceCore {
    extractor: SignalExtractor,
    content: Arc<ContentStore>,
    criteria: Arc<CriteriaRegistry>,
    alerts: Arc<AlertStore>,
    tracker: Arc<PredictionTracker>,
    providers: Vec<Box<dyn ContentProvider>>,
    market: Option<Arc<dyn MarketDataProvider>>,
    delivery: DeliveryMux,
    clock: Arc<dyn Clock>,
    scheduler: OnceCell<TaskScheduler>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntelligenceCore {
    pub fn new(
        criteria: CriteriaRegistry,
        evaluator: Arc<dyn OutcomeEvaluator>,
        providers: Vec<Box<dyn ContentProvider>>,
        market: Option<Arc<dyn MarketDataProvider>>,
        delivery: DeliveryMux,
    ) -> Self {
        Self::with_clock(
            criteria,
            evaluator,
            providers,
            market,
            delivery,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        criteria: CriteriaRegistry,
        evaluator: Arc<dyn OutcomeEvaluator>,
        providers: Vec<Box<dyn ContentProvider>>,
        market: Option<Arc<dyn MarketDataProvider>>,
        delivery: DeliveryMux,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            extractor: SignalExtractor::new(),
            content: Arc::new(ContentStore::new()),
            criteria: Arc::new(criteria),
            alerts: Arc::new(AlertStore::new()),
            tracker: Arc::new(PredictionTracker::new(evaluator)),
            providers,
            market,
            delivery,
            clock,
            scheduler: OnceCell::new(),
            sweep_handle: Mutex::new(None),
        }
    }

    /// Start the scheduler loops and the hourly evaluation/housekeeping
    /// sweep. Call once after wrapping the core in an `Arc`.
    pub fn start(self: &Arc<Self>, schedule: ScheduleConfig) {
        let runner: Arc<dyn JobRunner> = Arc::clone(self) as Arc<dyn JobRunner>;
        let scheduler = TaskScheduler::new(schedule, runner, Arc::clone(&self.clock));
        if self.scheduler.set(scheduler).is_err() {
            tracing::warn!("intelligence core started twice; keeping first scheduler");
            return;
        }
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.start();
        }

        let core = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(EVALUATION_SWEEP_SECS));
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let now = core.clock.now();
                let evaluated = core.tracker.evaluate_due(now).await;
                let retired = core.content.sweep_expired(now);
                tracing::debug!(evaluated, retired, "housekeeping sweep finished");
            }
        });
        *self.sweep_handle.lock().expect("sweep handle mutex poisoned") = Some(handle);
    }

    /// Stop the scheduler (letting any in-flight job settle) and cancel the
    /// housekeeping timer.
    pub async fn stop(&self) {
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.stop().await;
        }
        if let Some(handle) = self
            .sweep_handle
            .lock()
            .expect("sweep handle mutex poisoned")
            .take()
        {
            handle.abort();
        }
    }

    // ---- content-check job body ----

    /// Poll every provider once and push the batch through the pipeline:
    /// extract → store → evaluate criteria → record alerts → mirror
    /// predictions. Items are processed in arrival order.
    pub async fn ingest_once(&self) -> Result<serde_json::Value> {
        let (batch, dropped, deduped) =
            poll_once(&self.providers, DEFAULT_DEDUP_WINDOW_SECS).await;
        let mut payload = self.process_batch(batch);
        payload["dropped_empty"] = serde_json::json!(dropped);
        payload["deduplicated"] = serde_json::json!(deduped);
        Ok(payload)
    }

    /// Pipeline body for an already-fetched batch (also used by tests and
    /// by embedded callers that bypass polling).
    pub fn process_batch(&self, batch: Vec<crate::content::ContentItem>) -> serde_json::Value {
        let now = self.clock.now();
        let enabled = self.criteria.enabled();
        let mut stored = Vec::with_capacity(batch.len());
        let mut alerts_fired = 0usize;
        let mut predictions_tracked = 0usize;

        for raw_item in batch {
            let item = self.extractor.analyze(raw_item);

            for alert in alert_engine::evaluate(&item, &enabled, now) {
                let track = enabled
                    .iter()
                    .find(|c| c.id == alert.criteria_id)
                    .map(|c| c.actions.track_performance)
                    .unwrap_or(false);
                if track {
                    self.tracker.track_from_alert(&alert, now);
                    predictions_tracked += 1;
                }
                counter!("alerts_fired_total").increment(1);
                self.alerts.record(alert);
                alerts_fired += 1;
            }

            // Extracted predictions with a clear asset become trackable too.
            if item.processed
                && item.prediction_count() > 0
                && !item.metadata.mentioned_assets.is_empty()
            {
                let asset = item.metadata.mentioned_assets[0].clone();
                let catalysts = item
                    .insights
                    .as_ref()
                    .map(|i| i.predictions.clone())
                    .unwrap_or_default();
                self.tracker.track(
                    asset,
                    item.text.clone(),
                    0.6,
                    "3 months",
                    None,
                    catalysts,
                    format!("content:{}", item.metadata.author),
                    now,
                );
                predictions_tracked += 1;
            }

            stored.push(item);
        }

        let count = stored.len();
        self.content.store(stored);

        serde_json::json!({
            "items_ingested": count,
            "alerts_fired": alerts_fired,
            "predictions_tracked": predictions_tracked,
        })
    }

    // ---- briefing / digest / report builders ----

    /// Build a bundle over the trailing `window_hours` of content.
    pub async fn build_bundle(&self, kind: &str, window_hours: i64) -> IntelligenceBundle {
        let now = self.clock.now();
        let since = now - Duration::hours(window_hours);
        let digest = self.content.summarize(since, now);
        let opportunities = self.alerts.active();

        let mut snapshots = Vec::new();
        if let Some(market) = &self.market {
            for asset in digest.mentioned_assets.iter().take(5) {
                match market.snapshot(asset).await {
                    Ok(s) => snapshots.push(s),
                    Err(e) => {
                        tracing::warn!(asset = %asset, error = %e, "market snapshot unavailable")
                    }
                }
            }
        }

        IntelligenceBundle {
            id: format!("{kind}-{}", now.timestamp()),
            kind: kind.to_string(),
            date: now.date_naive().to_string(),
            market_pulse: MarketPulse {
                items_analyzed: digest.total,
                assets_in_focus: digest.mentioned_assets.clone(),
                snapshots,
            },
            knowledge_digest: digest,
            opportunities,
        }
    }

    async fn run_briefing(&self, kind: &str, window_hours: i64) -> Result<serde_json::Value> {
        let bundle = self.build_bundle(kind, window_hours).await;
        self.delivery.deliver(&bundle).await;
        serde_json::to_value(&bundle).map_err(|e| anyhow!("bundle serialization failed: {e}"))
    }

    async fn run_alert_sweep(&self) -> Result<serde_json::Value> {
        let now = self.clock.now();
        let swept = self.alerts.sweep(now);
        let active = self.alerts.active();
        let immediate: Vec<&OpportunityAlert> = active
            .iter()
            .filter(|a| a.urgency == AlertUrgency::Immediate)
            .collect();
        if !immediate.is_empty() && !self.delivery.is_empty() {
            let bundle = self.build_bundle("opportunity-alert", 24).await;
            self.delivery.deliver(&bundle).await;
        }
        Ok(serde_json::json!({
            "swept": swept,
            "active": active.len(),
            "immediate": immediate.len(),
        }))
    }

    // ---- public command surface (§ external interfaces) ----

    /// On-demand briefing; `None` means "unavailable, try again".
    pub async fn trigger_manual_briefing(&self) -> Option<IntelligenceBundle> {
        self.trigger(TaskType::MorningBriefing).await
    }

    /// On-demand digest; `None` means "unavailable, try again".
    pub async fn trigger_manual_digest(&self) -> Option<IntelligenceBundle> {
        self.trigger(TaskType::KnowledgeDigest).await
    }

    async fn trigger(&self, task_type: TaskType) -> Option<IntelligenceBundle> {
        let value = match self.scheduler.get() {
            // Through the scheduler: same retry/backoff and metrics
            // accounting, without touching the recurring timers.
            Some(s) => match s.run_now(task_type).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(task_type = task_type.label(), error = %e, "manual trigger failed");
                    return None;
                }
            },
            // Not started yet (library use): build directly.
            None => {
                let (kind, hours) = match task_type {
                    TaskType::KnowledgeDigest => ("knowledge-digest", 24 * 7),
                    _ => ("morning-briefing", 24),
                };
                return Some(self.build_bundle(kind, hours).await);
            }
        };
        serde_json::from_value(value).ok()
    }

    pub fn active_alerts(&self) -> Vec<OpportunityAlert> {
        self.alerts.active()
    }

    pub fn alert_history(&self, limit: usize) -> Vec<OpportunityAlert> {
        self.alerts.history(limit)
    }

    pub fn alert_metrics(&self) -> AlertMetrics {
        self.alerts.metrics()
    }

    pub fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        self.scheduler
            .get()
            .map(|s| s.store().scheduled())
            .unwrap_or_default()
    }

    pub fn task_history(&self, limit: usize) -> Vec<ScheduledTask> {
        self.scheduler
            .get()
            .map(|s| s.store().history(limit))
            .unwrap_or_default()
    }

    pub fn scheduler_metrics(&self) -> Option<SchedulerMetrics> {
        self.scheduler.get().map(|s| s.metrics())
    }

    pub fn update_schedule_config(&self, patch: ScheduleConfigPatch) -> Option<ScheduleConfig> {
        self.scheduler.get().map(|s| s.update_config(patch))
    }

    pub fn predictions(&self, status: Option<PredictionStatus>) -> Vec<Prediction> {
        self.tracker.predictions(status)
    }

    pub fn outcomes(&self, limit: usize) -> Vec<PredictionOutcome> {
        self.tracker.outcomes(limit)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.tracker.performance_metrics(self.clock.now())
    }

    pub fn performance_report(&self, days: i64) -> PerformanceReport {
        self.tracker.performance_report(days, self.clock.now())
    }

    pub fn criteria(&self) -> &CriteriaRegistry {
        &self.criteria
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn tracker(&self) -> &PredictionTracker {
        &self.tracker
    }

    /// Run the tracker's evaluation sweep once (also runs hourly in the
    /// background after `start`).
    pub async fn evaluate_predictions_now(&self) -> usize {
        self.tracker.evaluate_due(self.clock.now()).await
    }
}

#[async_trait]
impl JobRunner for IntelligenceCore {
    async fn run(&self, task_type: TaskType) -> Result<serde_json::Value> {
        match task_type {
            TaskType::MorningBriefing => self.run_briefing("morning-briefing", 24).await,
            TaskType::KnowledgeDigest => self.run_briefing("knowledge-digest", 24 * 7).await,
            TaskType::OpportunityAlert => self.run_alert_sweep().await,
            TaskType::PerformanceReport => {
                let report = self.tracker.performance_report(30, self.clock.now());
                serde_json::to_value(&report).map_err(|e| anyhow!("report serialization: {e}"))
            }
            TaskType::ContentCheck => self.ingest_once().await,
        }
    }
}
