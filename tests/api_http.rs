// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use signal_sentinel::api;
use signal_sentinel::criteria::CriteriaRegistry;
use signal_sentinel::notify::DeliveryMux;
use signal_sentinel::pipeline::IntelligenceCore;
use signal_sentinel::predict::{OutcomeEvaluator, Prediction, PredictionOutcome};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct NeverEvaluator;

#[async_trait]
impl OutcomeEvaluator for NeverEvaluator {
    async fn evaluate(&self, _: &Prediction, _: DateTime<Utc>) -> Result<PredictionOutcome> {
        anyhow::bail!("not used in http tests")
    }
}

/// Build the same Router the binary uses, minus the metrics exporter.
fn test_router() -> Router {
    router_with(None)
}

fn router_with(metrics: Option<PrometheusHandle>) -> Router {
    let core = Arc::new(IntelligenceCore::new(
        CriteriaRegistry::with_defaults(),
        Arc::new(NeverEvaluator),
        vec![],
        None,
        DeliveryMux::new(vec![]),
    ));
    api::create_router(core, "config/alert_criteria.json".into(), metrics)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_reports_clean_slate() {
    let (status, v) = get_json(test_router(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["success_rate"], 1.0);
    assert_eq!(v["active_alerts"], 0);
}

#[tokio::test]
async fn alerts_endpoints_start_empty() {
    let (status, v) = get_json(test_router(), "/alerts/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(|a| a.len()), Some(0));

    let (status, v) = get_json(test_router(), "/alerts/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total_alerts"], 0);
}

#[tokio::test]
async fn criteria_listing_returns_default_seed() {
    let (status, v) = get_json(test_router(), "/criteria").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = v
        .as_array()
        .expect("array body")
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.contains(&"thesis-momentum"));
}

#[tokio::test]
async fn manual_briefing_returns_a_bundle() {
    let req = Request::builder()
        .method("POST")
        .uri("/trigger/briefing")
        .body(Body::empty())
        .expect("build POST /trigger/briefing");
    let resp = test_router().oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("bundle json");
    assert_eq!(v["kind"], "morning-briefing");
    assert!(v.get("market_pulse").is_some(), "missing 'market_pulse'");
    assert!(
        v.get("knowledge_digest").is_some(),
        "missing 'knowledge_digest'"
    );
}

#[tokio::test]
async fn scheduler_endpoints_unavailable_before_start() {
    let (status, _) = get_json(test_router(), "/scheduler/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let req = Request::builder()
        .method("POST")
        .uri("/scheduler/config")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .expect("build POST /scheduler/config");
    let resp = test_router().oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn performance_report_honours_days_param() {
    let (status, v) = get_json(test_router(), "/performance/report?days=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["period_days"], 7);
    assert_eq!(v["outcomes_in_period"], 0);
}

#[tokio::test]
async fn metrics_route_renders_exposition() {
    // A local (non-installed) recorder is enough to exercise the route.
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let app = router_with(Some(handle));

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_route_absent_without_recorder() {
    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("build request");
    let resp = test_router().oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn predictions_filter_accepts_status() {
    let (status, v) = get_json(test_router(), "/predictions?status=active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(|a| a.len()), Some(0));
}
