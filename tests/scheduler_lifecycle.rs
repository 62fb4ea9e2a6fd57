// tests/scheduler_lifecycle.rs
//
// Core + scheduler wired together: manual triggers go through the task
// lifecycle and metrics accounting, and shutdown winds the loops down
// without leaving tasks parked in `running`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use signal_sentinel::criteria::CriteriaRegistry;
use signal_sentinel::notify::DeliveryMux;
use signal_sentinel::pipeline::IntelligenceCore;
use signal_sentinel::predict::{OutcomeEvaluator, Prediction, PredictionOutcome};
use signal_sentinel::schedule::ScheduleConfig;

struct NeverEvaluator;

#[async_trait]
impl OutcomeEvaluator for NeverEvaluator {
    async fn evaluate(&self, _: &Prediction, _: DateTime<Utc>) -> Result<PredictionOutcome> {
        anyhow::bail!("not used here")
    }
}

fn started_core() -> Arc<IntelligenceCore> {
    let core = Arc::new(IntelligenceCore::new(
        CriteriaRegistry::with_defaults(),
        Arc::new(NeverEvaluator),
        vec![],
        None,
        DeliveryMux::new(vec![]),
    ));
    core.start(ScheduleConfig::default());
    core
}

#[tokio::test]
async fn manual_trigger_is_accounted_as_a_task() {
    let core = started_core();

    let bundle = core
        .trigger_manual_briefing()
        .await
        .expect("briefing builds");
    assert_eq!(bundle.kind, "morning-briefing");

    let metrics = core.scheduler_metrics().expect("scheduler started");
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.failed, 0);
    assert!((metrics.success_rate - 1.0).abs() < 1e-9);

    let history = core.task_history(10);
    assert_eq!(history.len(), 1);
    assert!(history[0].executed_at.is_some());
    assert!(history[0].result.is_some());

    core.stop().await;
}

#[tokio::test]
async fn manual_digest_covers_a_week() {
    let core = started_core();
    let bundle = core.trigger_manual_digest().await.expect("digest builds");
    assert_eq!(bundle.kind, "knowledge-digest");
    core.stop().await;
}

#[tokio::test]
async fn stop_terminates_cleanly_with_no_running_tasks() {
    let core = started_core();
    core.trigger_manual_briefing().await.expect("briefing");
    core.stop().await;

    let metrics = core.scheduler_metrics().expect("metrics readable after stop");
    assert_eq!(metrics.running, 0);

    // Config stays queryable after shutdown.
    assert!(core
        .update_schedule_config(Default::default())
        .is_some());
}

#[tokio::test]
async fn schedule_config_patch_round_trips() {
    let core = started_core();

    let patch: signal_sentinel::schedule::ScheduleConfigPatch = serde_json::from_value(
        serde_json::json!({
            "content_check": { "enabled": false, "cadence": { "kind": "every", "secs": 60 } }
        }),
    )
    .expect("patch shape");

    let cfg = core.update_schedule_config(patch).expect("scheduler started");
    assert!(!cfg.content_check.enabled);
    assert!(cfg.morning_briefing.enabled);

    core.stop().await;
}
