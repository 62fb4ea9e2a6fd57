//! # Alert Criteria
//!
//! Named, prioritized, user-configurable matching rules. A criterion fires
//! when enough independent signal categories match the same content item
//! (its confluence threshold). Criteria are validated at registration so a
//! broken definition never reaches evaluation.
//!
//! - Loads from JSON config (`config/alert_criteria.json` by default).
//! - Falls back to a built-in `default_seed()` of five rules.
//! - Held in a registry behind `RwLock` so the set is runtime-editable.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::RwLock};

use crate::content::{Importance, Sentiment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Condition set: which signal categories this rule looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConditions {
    /// Target asset identifiers (canonical ids, e.g. "bitcoin").
    #[serde(default)]
    pub assets: Vec<String>,
    /// Keyword list matched against the lower-cased text.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_sentiment: Option<Sentiment>,
    /// Number of independent signal categories that must match simultaneously.
    #[serde(default = "default_confluence")]
    pub min_confluence: usize,
}

fn default_confluence() -> usize {
    1
}

impl Default for CriteriaConditions {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            keywords: Vec::new(),
            required_importance: None,
            required_sentiment: None,
            min_confluence: default_confluence(),
        }
    }
}

/// What to do when the rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaActions {
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub generate_report: bool,
    #[serde(default)]
    pub track_performance: bool,
}

impl Default for CriteriaActions {
    fn default() -> Self {
        Self {
            notify: true,
            generate_report: false,
            track_performance: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCriteria {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub priority: Priority,
    pub conditions: CriteriaConditions,
    #[serde(default)]
    pub actions: CriteriaActions,
}

fn default_enabled() -> bool {
    true
}

impl AlertCriteria {
    /// Registration-time validation. A criterion must target something
    /// concrete: either assets or keywords (importance/sentiment alone would
    /// match far too broadly), and its confluence threshold must be >= 1.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("criteria id must not be empty");
        }
        if self.name.trim().is_empty() {
            bail!("criteria '{}': name must not be empty", self.id);
        }
        if self.conditions.min_confluence == 0 {
            bail!("criteria '{}': min_confluence must be >= 1", self.id);
        }
        if self.conditions.assets.is_empty() && self.conditions.keywords.is_empty() {
            bail!(
                "criteria '{}': needs at least one target asset or keyword",
                self.id
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CriteriaFile {
    criteria: Vec<AlertCriteria>,
}

/// Runtime-editable set of criteria.
#[derive(Debug)]
pub struct CriteriaRegistry {
    inner: RwLock<Vec<AlertCriteria>>,
}

impl CriteriaRegistry {
    /// Registry seeded with the built-in default rules.
    pub fn with_defaults() -> Self {
        Self {
            inner: RwLock::new(default_seed()),
        }
    }

    /// Load from a JSON file; falls back to `default_seed()` when the file is
    /// missing or invalid (invalid individual entries are skipped and logged).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let loaded = fs::read_to_string(path.as_ref())
            .ok()
            .and_then(|s| serde_json::from_str::<CriteriaFile>(&s).ok())
            .map(|f| {
                f.criteria
                    .into_iter()
                    .filter(|c| match c.validate() {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(criteria = %c.id, error = %e, "skipping invalid criteria from config");
                            false
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty());

        Self {
            inner: RwLock::new(loaded.unwrap_or_else(default_seed)),
        }
    }

    /// Snapshot of every criterion (enabled or not).
    pub fn all(&self) -> Vec<AlertCriteria> {
        self.inner.read().expect("criteria rwlock poisoned").clone()
    }

    /// Snapshot of enabled criteria, highest priority first.
    pub fn enabled(&self) -> Vec<AlertCriteria> {
        let mut v: Vec<AlertCriteria> = self
            .inner
            .read()
            .expect("criteria rwlock poisoned")
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        v.sort_by_key(|c| std::cmp::Reverse(c.priority as u8));
        v
    }

    /// Add a new criterion. Fails on validation error or duplicate id.
    pub fn add(&self, criteria: AlertCriteria) -> Result<()> {
        criteria.validate().context("rejecting criteria at registration")?;
        let mut guard = self.inner.write().expect("criteria rwlock poisoned");
        if guard.iter().any(|c| c.id == criteria.id) {
            bail!("criteria '{}' already registered", criteria.id);
        }
        guard.push(criteria);
        Ok(())
    }

    /// Replace an existing criterion by id (explicit update path).
    pub fn update(&self, criteria: AlertCriteria) -> Result<()> {
        criteria.validate().context("rejecting criteria update")?;
        let mut guard = self.inner.write().expect("criteria rwlock poisoned");
        match guard.iter_mut().find(|c| c.id == criteria.id) {
            Some(slot) => {
                *slot = criteria;
                Ok(())
            }
            None => bail!("criteria '{}' not found", criteria.id),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.inner.write().expect("criteria rwlock poisoned");
        let before = guard.len();
        guard.retain(|c| c.id != id);
        guard.len() != before
    }

    /// Swap in a freshly loaded set (admin reload).
    pub fn replace_all(&self, fresh: Vec<AlertCriteria>) {
        let mut guard = self.inner.write().expect("criteria rwlock poisoned");
        *guard = fresh;
    }
}

/// The five rules the engine ships with. All user-editable afterwards.
pub fn default_seed() -> Vec<AlertCriteria> {
    vec![
        AlertCriteria {
            id: "thesis-momentum".into(),
            name: "Thesis momentum".into(),
            description: "Institutional adoption signals around the core thesis asset".into(),
            enabled: true,
            priority: Priority::High,
            conditions: CriteriaConditions {
                assets: vec!["bitcoin".into()],
                keywords: vec![
                    "institutional".into(),
                    "treasury".into(),
                    "reserve".into(),
                    "adoption".into(),
                    "etf".into(),
                ],
                required_importance: Some(Importance::High),
                required_sentiment: None,
                min_confluence: 2,
            },
            actions: CriteriaActions::default(),
        },
        AlertCriteria {
            id: "treasury-strategy".into(),
            name: "Treasury strategy follow-through".into(),
            description: "Corporate balance-sheet moves into the asset".into(),
            enabled: true,
            priority: Priority::High,
            conditions: CriteriaConditions {
                assets: vec!["bitcoin".into()],
                keywords: vec![
                    "treasury".into(),
                    "balance sheet".into(),
                    "corporate".into(),
                    "holdings".into(),
                ],
                required_importance: None,
                required_sentiment: None,
                min_confluence: 1,
            },
            actions: CriteriaActions::default(),
        },
        AlertCriteria {
            id: "altcoin-rotation".into(),
            name: "Altcoin rotation signals".into(),
            description: "Capital rotating from majors into alts".into(),
            enabled: true,
            priority: Priority::Medium,
            conditions: CriteriaConditions {
                assets: vec![
                    "ethereum".into(),
                    "solana".into(),
                    "cardano".into(),
                    "avalanche".into(),
                ],
                keywords: vec![
                    "rotation".into(),
                    "altseason".into(),
                    "alt season".into(),
                    "outperform".into(),
                ],
                required_importance: None,
                required_sentiment: Some(Sentiment::Bullish),
                min_confluence: 2,
            },
            actions: CriteriaActions::default(),
        },
        AlertCriteria {
            id: "yield-optimization".into(),
            name: "Yield optimization signals".into(),
            description: "Staking/yield opportunities worth a look".into(),
            enabled: true,
            priority: Priority::Medium,
            conditions: CriteriaConditions {
                assets: vec!["ethereum".into(), "solana".into()],
                keywords: vec![
                    "yield".into(),
                    "staking".into(),
                    "apy".into(),
                    "farming".into(),
                ],
                required_importance: None,
                required_sentiment: None,
                min_confluence: 1,
            },
            actions: CriteriaActions {
                notify: false,
                generate_report: true,
                track_performance: false,
            },
        },
        AlertCriteria {
            id: "emerging-opportunity".into(),
            name: "Emerging opportunity watch".into(),
            description: "Early-stage launches and airdrops".into(),
            enabled: true,
            priority: Priority::Low,
            conditions: CriteriaConditions {
                assets: vec![],
                keywords: vec![
                    "launch".into(),
                    "airdrop".into(),
                    "testnet".into(),
                    "new protocol".into(),
                ],
                required_importance: Some(Importance::High),
                required_sentiment: None,
                min_confluence: 2,
            },
            actions: CriteriaActions {
                notify: false,
                generate_report: false,
                track_performance: true,
            },
        },
    ]
}
