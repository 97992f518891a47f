//! Subscription tier budgets.
//!
//! Tier records are owned by an external configuration store. This module
//! only reads them: [`TierSource`] is the seam to that store, and
//! [`TierCache`] is an explicit read-through cache in front of it that the
//! store's owner refreshes out-of-band.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{PoisonError, RwLock},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RigError;

/// Bytes per "MB" in tier records (MiB).
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Tier record exactly as the configuration store supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRecord {
    pub plan_id: String,
    pub max_bones: usize,
    pub max_morph_targets: usize,
    #[serde(rename = "maxFileSizeMB")]
    pub max_file_size_mb: u64,
}

/// Numeric ceilings for one rigging request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBudget {
    pub plan_id: String,
    pub max_bones: usize,
    pub max_morph_targets: usize,
    pub max_file_size_bytes: u64,
}

impl From<&TierRecord> for TierBudget {
    fn from(record: &TierRecord) -> Self {
        Self {
            plan_id: record.plan_id.clone(),
            max_bones: record.max_bones,
            max_morph_targets: record.max_morph_targets,
            max_file_size_bytes: record.max_file_size_mb.saturating_mul(BYTES_PER_MB),
        }
    }
}

impl TierBudget {
    /// Copy of this budget with bone/morph maxima lowered to the given caps.
    /// Caps above the tier maxima have no effect.
    pub fn capped(&self, bone_cap: Option<usize>, morph_cap: Option<usize>) -> Self {
        Self {
            plan_id: self.plan_id.clone(),
            max_bones: bone_cap.map_or(self.max_bones, |cap| cap.min(self.max_bones)),
            max_morph_targets: morph_cap
                .map_or(self.max_morph_targets, |cap| cap.min(self.max_morph_targets)),
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }
}

/// Built-in tier table used when no tier file is configured.
pub fn builtin_tiers() -> Vec<TierRecord> {
    vec![
        TierRecord {
            plan_id: "free".to_string(),
            max_bones: 20,
            max_morph_targets: 10,
            max_file_size_mb: 25,
        },
        TierRecord {
            plan_id: "goat".to_string(),
            max_bones: 82,
            max_morph_targets: 100,
            max_file_size_mb: 95,
        },
    ]
}

// ─── Sources ──────────────────────────────────────────────────────────────────

/// Read-only access to the external tier configuration store.
pub trait TierSource: Send + Sync {
    fn fetch(&self, plan_id: &str) -> Option<TierRecord>;
}

/// In-memory tier source, typically loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticTierSource {
    records: HashMap<String, TierRecord>,
}

impl StaticTierSource {
    pub fn from_records(records: impl IntoIterator<Item = TierRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.plan_id.clone(), record))
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::from_records(builtin_tiers())
    }

    /// Load a JSON array of tier records.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read tier table: {}", path.display()))?;
        let records: Vec<TierRecord> =
            serde_json::from_str(&content).context("failed to parse tier table JSON")?;
        log::info!("loaded {} tier record(s) from {}", records.len(), path.display());
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TierSource for StaticTierSource {
    fn fetch(&self, plan_id: &str) -> Option<TierRecord> {
        self.records.get(plan_id).cloned()
    }
}

// ─── Resolution ───────────────────────────────────────────────────────────────

/// Maps a plan identifier to its budget.
pub trait TierResolver: Send + Sync {
    fn resolve(&self, plan_id: &str) -> Result<TierBudget, RigError>;
}

/// Read-through cache in front of a [`TierSource`].
///
/// Entries are filled on first lookup and stay until [`TierCache::invalidate`]
/// or [`TierCache::refresh`] is called by whoever owns the tier store.
#[derive(Debug)]
pub struct TierCache<S> {
    source: S,
    entries: RwLock<HashMap<String, TierBudget>>,
}

impl<S: TierSource> TierCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Drop one cached plan so the next lookup reads through again.
    pub fn invalidate(&self, plan_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plan_id);
    }

    /// Drop every cached plan.
    pub fn refresh(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cached_len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<S: TierSource> TierResolver for TierCache<S> {
    fn resolve(&self, plan_id: &str) -> Result<TierBudget, RigError> {
        if let Some(budget) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plan_id)
        {
            return Ok(budget.clone());
        }

        let record = self
            .source
            .fetch(plan_id)
            .ok_or_else(|| RigError::UnknownTier(plan_id.to_string()))?;
        let budget = TierBudget::from(&record);
        log::debug!(
            "resolved tier {}: {} bones, {} morphs, {} bytes",
            budget.plan_id,
            budget.max_bones,
            budget.max_morph_targets,
            budget.max_file_size_bytes
        );

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plan_id.to_string(), budget.clone());
        Ok(budget)
    }
}
