//! HTTP surface. Thin handlers over [`IntelligenceCore`]; no business logic
//! lives here.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;

use crate::alert::{AlertMetrics, OpportunityAlert};
use crate::criteria::{AlertCriteria, CriteriaRegistry};
use crate::pipeline::{IntelligenceBundle, IntelligenceCore};
use crate::predict::{
    PerformanceMetrics, PerformanceReport, Prediction, PredictionOutcome, PredictionStatus,
};
use crate::schedule::{ScheduleConfig, ScheduleConfigPatch, ScheduledTask, SchedulerMetrics};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_REPORT_DAYS: i64 = 30;

#[derive(Clone)]
pub struct AppState {
    core: Arc<IntelligenceCore>,
    criteria_path: String,
}

pub fn create_router(
    core: Arc<IntelligenceCore>,
    criteria_path: String,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = AppState {
        core,
        criteria_path,
    };

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/trigger/briefing", post(trigger_briefing))
        .route("/trigger/digest", post(trigger_digest))
        .route("/alerts/active", get(alerts_active))
        .route("/alerts/history", get(alerts_history))
        .route("/alerts/metrics", get(alerts_metrics))
        .route("/tasks", get(tasks))
        .route("/tasks/history", get(tasks_history))
        .route("/scheduler/metrics", get(scheduler_metrics))
        .route("/scheduler/config", post(scheduler_config))
        .route("/predictions", get(predictions))
        .route("/outcomes", get(outcomes))
        .route("/performance/metrics", get(performance_metrics))
        .route("/performance/report", get(performance_report))
        .route("/criteria", get(criteria_list))
        .route("/admin/reload-criteria", post(admin_reload_criteria));

    // Prometheus exposition, when a recorder was installed at startup.
    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        );
    }

    router.layer(CorsLayer::very_permissive()).with_state(state)
}

#[derive(serde::Serialize)]
struct HealthResp {
    status: &'static str,
    success_rate: f64,
    active_alerts: usize,
    active_predictions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let (status, success_rate) = match state.core.scheduler_metrics() {
        Some(m) => (m.system_health.label(), m.success_rate),
        // Nothing has run yet: report healthy with a clean slate.
        None => ("healthy", 1.0),
    };
    Json(HealthResp {
        status,
        success_rate,
        active_alerts: state.core.active_alerts().len(),
        active_predictions: state
            .core
            .predictions(Some(PredictionStatus::Active))
            .len(),
    })
}

async fn trigger_briefing(
    State(state): State<AppState>,
) -> (StatusCode, Json<Option<IntelligenceBundle>>) {
    match state.core.trigger_manual_briefing().await {
        Some(bundle) => (StatusCode::OK, Json(Some(bundle))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(None)),
    }
}

async fn trigger_digest(
    State(state): State<AppState>,
) -> (StatusCode, Json<Option<IntelligenceBundle>>) {
    match state.core.trigger_manual_digest().await {
        Some(bundle) => (StatusCode::OK, Json(Some(bundle))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(None)),
    }
}

async fn alerts_active(State(state): State<AppState>) -> Json<Vec<OpportunityAlert>> {
    Json(state.core.active_alerts())
}

async fn alerts_history(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<OpportunityAlert>> {
    Json(state.core.alert_history(limit_param(&q)))
}

async fn alerts_metrics(State(state): State<AppState>) -> Json<AlertMetrics> {
    Json(state.core.alert_metrics())
}

async fn tasks(State(state): State<AppState>) -> Json<Vec<ScheduledTask>> {
    Json(state.core.scheduled_tasks())
}

async fn tasks_history(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<ScheduledTask>> {
    Json(state.core.task_history(limit_param(&q)))
}

async fn scheduler_metrics(
    State(state): State<AppState>,
) -> (StatusCode, Json<Option<SchedulerMetrics>>) {
    match state.core.scheduler_metrics() {
        Some(m) => (StatusCode::OK, Json(Some(m))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(None)),
    }
}

async fn scheduler_config(
    State(state): State<AppState>,
    Json(patch): Json<ScheduleConfigPatch>,
) -> (StatusCode, Json<Option<ScheduleConfig>>) {
    match state.core.update_schedule_config(patch) {
        Some(cfg) => (StatusCode::OK, Json(Some(cfg))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(None)),
    }
}

async fn predictions(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<Prediction>> {
    let status = q.get("status").and_then(|s| match s.as_str() {
        "active" => Some(PredictionStatus::Active),
        "expired" => Some(PredictionStatus::Expired),
        "completed" => Some(PredictionStatus::Completed),
        _ => None,
    });
    Json(state.core.predictions(status))
}

async fn outcomes(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<PredictionOutcome>> {
    Json(state.core.outcomes(limit_param(&q)))
}

async fn performance_metrics(State(state): State<AppState>) -> Json<PerformanceMetrics> {
    Json(state.core.performance_metrics())
}

async fn performance_report(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<PerformanceReport> {
    let days = q
        .get("days")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_REPORT_DAYS);
    Json(state.core.performance_report(days))
}

async fn criteria_list(State(state): State<AppState>) -> Json<Vec<AlertCriteria>> {
    Json(state.core.criteria().all())
}

#[derive(serde::Serialize)]
struct ReloadResp {
    reloaded: bool,
    criteria_count: usize,
}

async fn admin_reload_criteria(State(state): State<AppState>) -> Json<ReloadResp> {
    let fresh = CriteriaRegistry::load_from_file(&state.criteria_path).all();
    let count = fresh.len();
    state.core.criteria().replace_all(fresh);
    tracing::info!(count, path = %state.criteria_path, "criteria reloaded");
    Json(ReloadResp {
        reloaded: true,
        criteria_count: count,
    })
}

fn limit_param(q: &HashMap<String, String>) -> usize {
    q.get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
}
