//! # Task Scheduler
//!
//! One spawned loop per job type: compute the next occurrence, sleep until
//! it, run the job through the retry path, then re-arm. Re-arming only after
//! the run settles guarantees runs of the same job type never overlap;
//! different job types run concurrently on their own loops.
//!
//! Failures back off `2^retry_count` seconds up to [`task::MAX_RETRIES`],
//! after which the task is `failed` permanently and counted in metrics.
//! Shutdown cancels every sleeping loop; a job mid-execution is allowed to
//! finish, and a task waiting on a retry is marked failed with a shutdown
//! reason rather than silently dropped.

pub mod config;
pub mod task;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::sync::{Arc, Mutex, RwLock};
use tokio::{sync::watch, task::JoinHandle, time::Duration};

pub use config::{Cadence, JobSchedule, ScheduleConfig, ScheduleConfigPatch};
pub use task::{
    ScheduledTask, SchedulerMetrics, SystemHealth, TaskStatus, TaskStore, TaskType, MAX_RETRIES,
};

/// Injected clock so next-occurrence math is testable without real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Executes one job body. The scheduler owns lifecycle and retries; the
/// runner owns the work and returns an opaque processed-intelligence payload.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, task_type: TaskType) -> Result<serde_json::Value>;
}

pub struct TaskScheduler {
    store: Arc<TaskStore>,
    config: Arc<RwLock<ScheduleConfig>>,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn JobRunner>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        config: ScheduleConfig,
        runner: Arc<dyn JobRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store: Arc::new(TaskStore::new()),
            config: Arc::new(RwLock::new(config)),
            clock,
            runner,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> Arc<TaskStore> {
        Arc::clone(&self.store)
    }

    /// Spawn one loop per job type. Idempotent only in the sense that the
    /// caller is expected to invoke it once at startup.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("handles mutex poisoned");
        for task_type in TaskType::ALL {
            let store = Arc::clone(&self.store);
            let config = Arc::clone(&self.config);
            let clock = Arc::clone(&self.clock);
            let runner = Arc::clone(&self.runner);
            let mut shutdown = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    let (enabled, cadence) = {
                        let cfg = config.read().expect("schedule config rwlock poisoned");
                        let job = cfg.job(task_type);
                        (job.enabled, job.cadence.clone())
                    };

                    if !enabled {
                        // Re-check the config every minute while disabled.
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_secs(60)) => continue,
                            _ = shutdown.changed() => break,
                        }
                    }

                    let now = clock.now();
                    let next = config::next_occurrence(&cadence, now);
                    let wait = (next - now).to_std().unwrap_or_default();
                    tracing::debug!(
                        task_type = task_type.label(),
                        next = %next,
                        "armed next occurrence"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = shutdown.changed() => break,
                    }

                    let task_id = store.create(task_type, next);
                    let _ = execute_with_retry(
                        &store,
                        runner.as_ref(),
                        clock.as_ref(),
                        &mut shutdown,
                        &task_id,
                        task_type,
                    )
                    .await;

                    if *shutdown.borrow() {
                        break;
                    }
                    // Loop continues: the next occurrence is computed only
                    // after this run settled, so same-type runs never overlap.
                }
                tracing::debug!(task_type = task_type.label(), "scheduler loop stopped");
            }));
        }
    }

    /// Schedule-and-immediately-execute outside the normal cadence, with the
    /// same retry/backoff and metrics accounting. The per-type loop timers
    /// are untouched, so the next scheduled occurrence is undisturbed.
    pub async fn run_now(&self, task_type: TaskType) -> Result<serde_json::Value> {
        let task_id = self.store.create(task_type, self.clock.now());
        let mut shutdown = self.shutdown_tx.subscribe();
        execute_with_retry(
            &self.store,
            self.runner.as_ref(),
            self.clock.as_ref(),
            &mut shutdown,
            &task_id,
            task_type,
        )
        .await
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.store.metrics()
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        self.config
            .read()
            .expect("schedule config rwlock poisoned")
            .clone()
    }

    /// Partial config update; loops pick the change up when they re-arm.
    pub fn update_config(&self, patch: ScheduleConfigPatch) -> ScheduleConfig {
        let mut cfg = self.config.write().expect("schedule config rwlock poisoned");
        cfg.apply(patch);
        cfg.clone()
    }

    /// Cancel every outstanding timer and wait for the loops to wind down.
    /// Jobs mid-execution finish; nothing is left parked in `running`.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("handles mutex poisoned");
            guard.drain(..).collect()
        };
        for h in handles {
            let _ = h.await;
        }
    }
}

/// Run a task through the `pending → running → completed|failed` lifecycle.
/// `executed_at` is set exactly once, on the first attempt.
async fn execute_with_retry(
    store: &TaskStore,
    runner: &dyn JobRunner,
    clock: &dyn Clock,
    shutdown: &mut watch::Receiver<bool>,
    task_id: &str,
    task_type: TaskType,
) -> Result<serde_json::Value> {
    let started = clock.now();
    store.with_task(task_id, |t| {
        t.status = TaskStatus::Running;
        if t.executed_at.is_none() {
            t.executed_at = Some(started);
        }
    });

    loop {
        let attempt = store
            .get(task_id)
            .map(|t| t.retry_count + 1)
            .unwrap_or(1);

        match runner.run(task_type).await {
            Ok(payload) => {
                store.with_task(task_id, |t| {
                    t.status = TaskStatus::Completed;
                    t.completed_at = Some(clock.now());
                    t.result = Some(payload.clone());
                });
                finish_metrics(store, task_type, true);
                tracing::info!(
                    task_id,
                    task_type = task_type.label(),
                    attempt,
                    "task completed"
                );
                return Ok(payload);
            }
            Err(e) => {
                tracing::warn!(
                    task_id,
                    task_type = task_type.label(),
                    attempt,
                    error = %e,
                    "task attempt failed"
                );
                let retry_count = store
                    .with_task(task_id, |t| {
                        t.last_error = Some(format!("{e:#}"));
                        t.retry_count
                    })
                    .unwrap_or(MAX_RETRIES);

                if retry_count >= MAX_RETRIES {
                    store.with_task(task_id, |t| {
                        t.status = TaskStatus::Failed;
                        t.completed_at = Some(clock.now());
                    });
                    finish_metrics(store, task_type, false);
                    return Err(anyhow!("task {task_id} failed permanently: {e:#}"));
                }

                let next_retry = store
                    .with_task(task_id, |t| {
                        t.retry_count += 1;
                        t.retry_count
                    })
                    .unwrap_or(MAX_RETRIES);
                let backoff = Duration::from_secs(1u64 << next_retry);

                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        store.with_task(task_id, |t| {
                            t.status = TaskStatus::Failed;
                            t.completed_at = Some(clock.now());
                            t.last_error = Some("shutdown requested during retry wait".into());
                        });
                        finish_metrics(store, task_type, false);
                        return Err(anyhow!("task {task_id} aborted by shutdown"));
                    }
                }
            }
        }
    }
}

/// Counters + health gauge, recomputed after every terminal transition.
fn finish_metrics(store: &TaskStore, task_type: TaskType, success: bool) {
    if success {
        counter!("scheduler_tasks_completed_total", "task_type" => task_type.label()).increment(1);
    } else {
        counter!("scheduler_tasks_failed_total", "task_type" => task_type.label()).increment(1);
    }
    let m = store.metrics();
    gauge!("scheduler_success_rate").set(m.success_rate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyRunner {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobRunner for FlakyRunner {
        async fn run(&self, _task_type: TaskType) -> Result<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(anyhow!("transient collaborator failure"))
            } else {
                Ok(serde_json::json!({ "attempt": n + 1 }))
            }
        }
    }

    fn scheduler(fail_first: u32) -> TaskScheduler {
        TaskScheduler::new(
            ScheduleConfig::default(),
            Arc::new(FlakyRunner {
                fail_first,
                calls: AtomicU32::new(0),
            }),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_succeeds_after_retries() {
        let s = scheduler(2);
        let t0 = tokio::time::Instant::now();
        let out = s.run_now(TaskType::ContentCheck).await.expect("succeeds on third attempt");
        assert_eq!(out["attempt"], serde_json::json!(3));
        // Two failed attempts wait 2s then 4s before the third succeeds.
        assert_eq!(t0.elapsed(), Duration::from_secs(6));

        let history = s.store().history(1);
        let t = &history[0];
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.retry_count, 2);
        assert!(t.executed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bound_is_enforced() {
        let s = scheduler(u32::MAX);
        let t0 = tokio::time::Instant::now();
        let err = s.run_now(TaskType::ContentCheck).await;
        assert!(err.is_err());
        // Backoffs of 2s, 4s and 8s precede the permanent failure.
        assert_eq!(t0.elapsed(), Duration::from_secs(14));

        let t = &s.store().history(1)[0];
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.retry_count, MAX_RETRIES);
        assert!(t.last_error.is_some());

        let m = s.metrics();
        assert_eq!(m.failed, 1);
        assert_eq!(m.system_health, SystemHealth::Critical);
    }

    struct SlowRunner {
        active: AtomicU32,
        max_active: AtomicU32,
    }

    #[async_trait]
    impl JobRunner for SlowRunner {
        async fn run(&self, _task_type: TaskType) -> Result<serde_json::Value> {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(7)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({}))
        }
    }

    fn only_content_check(secs: u64) -> ScheduleConfig {
        let mut cfg = ScheduleConfig::default();
        cfg.morning_briefing.enabled = false;
        cfg.knowledge_digest.enabled = false;
        cfg.opportunity_alert.enabled = false;
        cfg.performance_report.enabled = false;
        cfg.content_check = JobSchedule {
            enabled: true,
            cadence: Cadence::Every { secs },
        };
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn same_type_runs_never_overlap() {
        // The job takes 7s but fires every 5s; the loop must re-arm only
        // after each run settles, never stacking a second run on top.
        let runner = Arc::new(SlowRunner {
            active: AtomicU32::new(0),
            max_active: AtomicU32::new(0),
        });
        let s = TaskScheduler::new(
            only_content_check(5),
            runner.clone(),
            Arc::new(SystemClock),
        );
        s.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        s.stop().await;

        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);

        let mut done = s.store().history(10);
        assert!(done.len() >= 2);
        done.sort_by_key(|t| t.executed_at);
        for pair in done.windows(2) {
            assert_eq!(pair[0].status, TaskStatus::Completed);
            assert!(pair[0].completed_at <= pair[1].executed_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_counts_in_metrics() {
        let s = scheduler(0);
        s.run_now(TaskType::MorningBriefing).await.unwrap();
        s.run_now(TaskType::MorningBriefing).await.unwrap();
        let m = s.metrics();
        assert_eq!(m.completed, 2);
        assert_eq!(m.system_health, SystemHealth::Healthy);
        assert!((m.success_rate - 1.0).abs() < 1e-9);
    }
}
