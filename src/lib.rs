// src/lib.rs
// Public library surface for integration tests (and embedded reuse).

pub mod alert;
pub mod alert_engine;
pub mod api;
pub mod content;
pub mod content_store;
pub mod criteria;
pub mod extract;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod predict;
pub mod schedule;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::pipeline::{IntelligenceBundle, IntelligenceCore};
pub use crate::schedule::{ScheduleConfig, TaskScheduler, TaskType};
