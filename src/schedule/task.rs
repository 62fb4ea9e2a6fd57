//! Task model and store: one `ScheduledTask` per run of a recurring or
//! on-demand job, with the `pending → running → completed|failed` state
//! machine and scheduler-level health metrics.
//!
//! Tasks are never deleted; terminal tasks remain for audit/history queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Bound on automatic retries per task.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    MorningBriefing,
    KnowledgeDigest,
    OpportunityAlert,
    PerformanceReport,
    ContentCheck,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::MorningBriefing,
        TaskType::KnowledgeDigest,
        TaskType::OpportunityAlert,
        TaskType::PerformanceReport,
        TaskType::ContentCheck,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskType::MorningBriefing => "morning-briefing",
            TaskType::KnowledgeDigest => "knowledge-digest",
            TaskType::OpportunityAlert => "opportunity-alert",
            TaskType::PerformanceReport => "performance-report",
            TaskType::ContentCheck => "content-check",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TaskType::MorningBriefing => "Morning briefing",
            TaskType::KnowledgeDigest => "Knowledge digest",
            TaskType::OpportunityAlert => "Opportunity alert sweep",
            TaskType::PerformanceReport => "Performance report",
            TaskType::ContentCheck => "Content check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub task_type: TaskType,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    /// Set exactly once, when execution first starts (not re-set on retry).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque processed-intelligence payload produced by the job body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Critical,
}

impl SystemHealth {
    pub fn label(self) -> &'static str {
        match self {
            SystemHealth::Healthy => "healthy",
            SystemHealth::Degraded => "degraded",
            SystemHealth::Critical => "critical",
        }
    }
}

/// Aggregate scheduler health, recomputed after every terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub total_tasks: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// `completed / (completed + failed)`; 1.0 with no terminal tasks yet.
    pub success_rate: f64,
    pub system_health: SystemHealth,
}

#[derive(Debug, Default)]
pub struct TaskStore {
    inner: Mutex<Vec<ScheduledTask>>,
    seq: Mutex<u64>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending task and return its id.
    pub fn create(&self, task_type: TaskType, scheduled_for: DateTime<Utc>) -> String {
        let id = {
            let mut seq = self.seq.lock().expect("task seq mutex poisoned");
            *seq += 1;
            format!("task-{}-{}", task_type.label(), *seq)
        };
        let task = ScheduledTask {
            id: id.clone(),
            name: task_type.display_name().to_string(),
            task_type,
            scheduled_for,
            status: TaskStatus::Pending,
            executed_at: None,
            completed_at: None,
            result: None,
            last_error: None,
            retry_count: 0,
            max_retries: MAX_RETRIES,
        };
        self.inner.lock().expect("task store mutex poisoned").push(task);
        id
    }

    /// Mutate one task in place under the store lock.
    pub fn with_task<R>(&self, id: &str, f: impl FnOnce(&mut ScheduledTask) -> R) -> Option<R> {
        let mut guard = self.inner.lock().expect("task store mutex poisoned");
        guard.iter_mut().find(|t| t.id == id).map(f)
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTask> {
        let guard = self.inner.lock().expect("task store mutex poisoned");
        guard.iter().find(|t| t.id == id).cloned()
    }

    /// Non-terminal tasks (pending + running), soonest first.
    pub fn scheduled(&self) -> Vec<ScheduledTask> {
        let guard = self.inner.lock().expect("task store mutex poisoned");
        let mut v: Vec<ScheduledTask> = guard
            .iter()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        v.sort_by_key(|t| t.scheduled_for);
        v
    }

    /// Terminal tasks, most-recent-first.
    pub fn history(&self, limit: usize) -> Vec<ScheduledTask> {
        let guard = self.inner.lock().expect("task store mutex poisoned");
        guard
            .iter()
            .rev()
            .filter(|t| t.status.is_terminal())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let guard = self.inner.lock().expect("task store mutex poisoned");
        let mut m = SchedulerMetrics {
            total_tasks: guard.len(),
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            success_rate: 1.0,
            system_health: SystemHealth::Healthy,
        };
        for t in guard.iter() {
            match t.status {
                TaskStatus::Pending => m.pending += 1,
                TaskStatus::Running => m.running += 1,
                TaskStatus::Completed => m.completed += 1,
                TaskStatus::Failed => m.failed += 1,
            }
        }
        let terminal = m.completed + m.failed;
        if terminal > 0 {
            m.success_rate = m.completed as f64 / terminal as f64;
        }
        m.system_health = health_for(m.success_rate);
        m
    }
}

/// `healthy` >= 0.95, `degraded` >= 0.85, else `critical`.
pub fn health_for(success_rate: f64) -> SystemHealth {
    if success_rate >= 0.95 {
        SystemHealth::Healthy
    } else if success_rate >= 0.85 {
        SystemHealth::Degraded
    } else {
        SystemHealth::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_thresholds() {
        assert_eq!(health_for(1.0), SystemHealth::Healthy);
        assert_eq!(health_for(0.95), SystemHealth::Healthy);
        assert_eq!(health_for(0.94), SystemHealth::Degraded);
        assert_eq!(health_for(0.85), SystemHealth::Degraded);
        assert_eq!(health_for(0.84), SystemHealth::Critical);
    }

    #[test]
    fn store_tracks_status_counts() {
        let store = TaskStore::new();
        let a = store.create(TaskType::ContentCheck, Utc::now());
        let b = store.create(TaskType::MorningBriefing, Utc::now());
        store.with_task(&a, |t| t.status = TaskStatus::Completed);
        store.with_task(&b, |t| t.status = TaskStatus::Failed);

        let m = store.metrics();
        assert_eq!(m.total_tasks, 2);
        assert_eq!(m.completed, 1);
        assert_eq!(m.failed, 1);
        assert!((m.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(m.system_health, SystemHealth::Critical);
    }

    #[test]
    fn history_excludes_open_tasks() {
        let store = TaskStore::new();
        let a = store.create(TaskType::ContentCheck, Utc::now());
        store.create(TaskType::ContentCheck, Utc::now());
        store.with_task(&a, |t| t.status = TaskStatus::Completed);

        assert_eq!(store.history(10).len(), 1);
        assert_eq!(store.scheduled().len(), 1);
    }
}
