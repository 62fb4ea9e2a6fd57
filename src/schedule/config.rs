//! Schedule configuration: per-job cadences and the next-occurrence math.
//!
//! Recurring jobs fire at a configured time of day (daily/weekly/monthly) or
//! on a fixed interval. Computation is pure over an injected "now" so tests
//! stay deterministic. Loads from TOML with env override and built-in
//! defaults, like the rest of the config surface.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};

use super::task::TaskType;

const ENV_PATH: &str = "SCHEDULE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/schedule.toml";

/// When a recurring job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Every day at `time` ("HH:MM", UTC); optionally weekdays only.
    Daily {
        time: String,
        #[serde(default)]
        weekdays_only: bool,
    },
    /// Once a week on `weekday` ("monday".."sunday") at `time`.
    Weekly { weekday: String, time: String },
    /// Once a month on day-of-month `day` at `time`. Days past the end of a
    /// short month clamp to its last day.
    Monthly { day: u32, time: String },
    /// Fixed interval in seconds.
    Every { secs: u64 },
}

/// One job's schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub cadence: Cadence,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub morning_briefing: JobSchedule,
    pub knowledge_digest: JobSchedule,
    pub opportunity_alert: JobSchedule,
    pub performance_report: JobSchedule,
    pub content_check: JobSchedule,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            morning_briefing: JobSchedule {
                enabled: true,
                cadence: Cadence::Daily {
                    time: "07:00".into(),
                    weekdays_only: true,
                },
            },
            knowledge_digest: JobSchedule {
                enabled: true,
                cadence: Cadence::Weekly {
                    weekday: "sunday".into(),
                    time: "18:00".into(),
                },
            },
            opportunity_alert: JobSchedule {
                enabled: true,
                cadence: Cadence::Every { secs: 3600 },
            },
            performance_report: JobSchedule {
                enabled: true,
                cadence: Cadence::Monthly {
                    day: 1,
                    time: "09:00".into(),
                },
            },
            content_check: JobSchedule {
                enabled: true,
                cadence: Cadence::Every { secs: 900 },
            },
        }
    }
}

impl ScheduleConfig {
    pub fn job(&self, task_type: TaskType) -> &JobSchedule {
        match task_type {
            TaskType::MorningBriefing => &self.morning_briefing,
            TaskType::KnowledgeDigest => &self.knowledge_digest,
            TaskType::OpportunityAlert => &self.opportunity_alert,
            TaskType::PerformanceReport => &self.performance_report,
            TaskType::ContentCheck => &self.content_check,
        }
    }

    /// Load from `$SCHEDULE_CONFIG_PATH`, then `config/schedule.toml`,
    /// falling back to defaults when neither exists.
    pub fn load_default() -> Self {
        if let Ok(p) = std::env::var(ENV_PATH) {
            match Self::load_from(Path::new(&p)) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "schedule config from env failed; using defaults")
                }
            }
        } else if Path::new(DEFAULT_PATH).exists() {
            match Self::load_from(Path::new(DEFAULT_PATH)) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(error = %e, "schedule config invalid; using defaults"),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading schedule config from {}", path.display()))?;
        toml::from_str(&raw).context("parsing schedule config")
    }

    /// Apply a partial update; only present fields change.
    pub fn apply(&mut self, patch: ScheduleConfigPatch) {
        if let Some(j) = patch.morning_briefing {
            self.morning_briefing = j;
        }
        if let Some(j) = patch.knowledge_digest {
            self.knowledge_digest = j;
        }
        if let Some(j) = patch.opportunity_alert {
            self.opportunity_alert = j;
        }
        if let Some(j) = patch.performance_report {
            self.performance_report = j;
        }
        if let Some(j) = patch.content_check {
            self.content_check = j;
        }
    }
}

/// Partial config update for `updateScheduleConfig`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScheduleConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morning_briefing: Option<JobSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_digest: Option<JobSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_alert: Option<JobSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_report: Option<JobSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_check: Option<JobSchedule>,
}

/// Next wall-clock occurrence strictly after `now`.
///
/// Daily: if today's configured time is not strictly after now, roll forward
/// one day, then (weekdays-only) keep advancing one day at a time past
/// Saturday/Sunday. Weekly/monthly roll forward by their period the same way.
pub fn next_occurrence(cadence: &Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    match cadence {
        Cadence::Daily {
            time,
            weekdays_only,
        } => {
            let tod = parse_time(time);
            let mut candidate = at_time(now, tod);
            if candidate <= now {
                candidate += Duration::days(1);
            }
            if *weekdays_only {
                while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
                    candidate += Duration::days(1);
                }
            }
            candidate
        }
        Cadence::Weekly { weekday, time } => {
            let tod = parse_time(time);
            let target = parse_weekday(weekday);
            let mut candidate = at_time(now, tod);
            while candidate.weekday() != target {
                candidate += Duration::days(1);
            }
            if candidate <= now {
                candidate += Duration::days(7);
            }
            candidate
        }
        Cadence::Monthly { day, time } => {
            let tod = parse_time(time);
            let mut candidate = month_day(now, *day, tod);
            if candidate <= now {
                let next_month = if now.month() == 12 {
                    Utc.with_ymd_and_hms(now.year() + 1, 1, 1, 0, 0, 0)
                        .single()
                        .unwrap_or(now)
                } else {
                    Utc.with_ymd_and_hms(now.year(), now.month() + 1, 1, 0, 0, 0)
                        .single()
                        .unwrap_or(now)
                };
                candidate = month_day(next_month, *day, tod);
            }
            candidate
        }
        Cadence::Every { secs } => now + Duration::seconds((*secs).max(1) as i64),
    }
}

fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(7, 0, 0).expect("valid fallback time"))
}

fn parse_weekday(s: &str) -> Weekday {
    Weekday::from_str(s).unwrap_or(Weekday::Sun)
}

fn at_time(base: DateTime<Utc>, tod: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&base.date_naive().and_time(tod))
}

/// `day`-of-month clamped to the month's length, at `tod`.
fn month_day(base: DateTime<Utc>, day: u32, tod: NaiveTime) -> DateTime<Utc> {
    let first = base
        .date_naive()
        .with_day(1)
        .expect("day 1 always exists");
    let days_in_month = {
        let next = if first.month() == 12 {
            first.with_year(first.year() + 1).and_then(|d| d.with_month(1))
        } else {
            first.with_month(first.month() + 1)
        };
        next.map(|n| (n - first).num_days() as u32).unwrap_or(28)
    };
    let date = first
        .with_day(day.clamp(1, days_in_month))
        .unwrap_or(first);
    Utc.from_utc_datetime(&date.and_time(tod))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_time_passed() {
        let cadence = Cadence::Daily {
            time: "07:00".into(),
            weekdays_only: false,
        };
        // 2026-08-28 is a Friday.
        let now = utc(2026, 8, 28, 8, 0);
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 8, 29, 7, 0));
    }

    #[test]
    fn weekdays_only_skips_weekend() {
        let cadence = Cadence::Daily {
            time: "07:00".into(),
            weekdays_only: true,
        };
        // Friday 08:00 → following Monday 07:00, not Saturday.
        let now = utc(2026, 8, 28, 8, 0);
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 8, 31, 7, 0));
    }

    #[test]
    fn daily_same_day_when_time_still_ahead() {
        let cadence = Cadence::Daily {
            time: "07:00".into(),
            weekdays_only: true,
        };
        let now = utc(2026, 8, 28, 6, 0);
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 8, 28, 7, 0));
    }

    #[test]
    fn weekly_hits_requested_weekday() {
        let cadence = Cadence::Weekly {
            weekday: "sunday".into(),
            time: "18:00".into(),
        };
        let now = utc(2026, 8, 28, 8, 0); // Friday
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 8, 30, 18, 0));

        // Exactly at the slot → next week.
        let at_slot = utc(2026, 8, 30, 18, 0);
        assert_eq!(next_occurrence(&cadence, at_slot), utc(2026, 9, 6, 18, 0));
    }

    #[test]
    fn monthly_rolls_to_next_month_and_clamps() {
        let cadence = Cadence::Monthly {
            day: 31,
            time: "09:00".into(),
        };
        let now = utc(2026, 8, 31, 10, 0);
        // September has 30 days; day 31 clamps to the 30th.
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 9, 30, 9, 0));
    }

    #[test]
    fn interval_is_strictly_after_now() {
        let cadence = Cadence::Every { secs: 900 };
        let now = utc(2026, 8, 28, 8, 0);
        assert_eq!(next_occurrence(&cadence, now), utc(2026, 8, 28, 8, 15));
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut cfg = ScheduleConfig::default();
        cfg.apply(ScheduleConfigPatch {
            content_check: Some(JobSchedule {
                enabled: false,
                cadence: Cadence::Every { secs: 60 },
            }),
            ..Default::default()
        });
        assert!(!cfg.content_check.enabled);
        // Untouched entries keep their defaults.
        assert!(cfg.morning_briefing.enabled);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = ScheduleConfig::default();
        let raw = toml::to_string(&cfg).unwrap();
        let back: ScheduleConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back, cfg);
    }
}
