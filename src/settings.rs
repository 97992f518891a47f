use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rig::{DEFAULT_EXTENSION_NAME, DEFAULT_SEED, Deadline, RigOptions, StaticAdvisor};
use crate::tier::StaticTierSource;

/// Persisted settings used by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigSettings {
    /// Seed for morph delta generation.
    pub seed: u64,
    /// Per-request timeout; `None` disables the deadline.
    pub timeout_ms: Option<u64>,
    pub extension_name: String,
    /// JSON tier table; the built-in tiers are used when unset.
    pub tiers_path: Option<PathBuf>,
    /// Worker threads for morph generation; rayon's default when unset.
    pub threads: Option<usize>,
    pub bone_cap: Option<usize>,
    pub morph_cap: Option<usize>,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            timeout_ms: None,
            extension_name: DEFAULT_EXTENSION_NAME.to_string(),
            tiers_path: None,
            threads: None,
            bone_cap: None,
            morph_cap: None,
        }
    }
}

impl RigSettings {
    /// Per-request options. The deadline starts counting now.
    pub fn rig_options(&self) -> RigOptions {
        RigOptions {
            seed: self.seed,
            deadline: self
                .timeout_ms
                .map_or_else(Deadline::none, |ms| Deadline::after(Duration::from_millis(ms))),
            extension_name: self.extension_name.clone(),
        }
    }

    /// Advisor built from the configured caps, if any.
    pub fn advisor(&self) -> Option<StaticAdvisor> {
        if self.bone_cap.is_none() && self.morph_cap.is_none() {
            return None;
        }
        Some(StaticAdvisor {
            bone_cap: self.bone_cap,
            morph_cap: self.morph_cap,
        })
    }

    /// Tier source from `tiers_path`, or the built-in tiers.
    pub fn tier_source(&self) -> Result<StaticTierSource> {
        match &self.tiers_path {
            Some(path) => StaticTierSource::load(path),
            None => Ok(StaticTierSource::builtin()),
        }
    }
}

/// Save rig settings to a JSON file.
pub fn save_settings(path: &Path, settings: &RigSettings) -> Result<()> {
    let content =
        serde_json::to_string_pretty(settings).context("failed to serialize rig settings as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save rig settings: {}", path.display()))?;
    Ok(())
}

/// Load rig settings from a JSON file. Missing fields take their defaults.
pub fn load_settings(path: &Path) -> Result<RigSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load rig settings: {}", path.display()))?;
    let settings: RigSettings =
        serde_json::from_str(&content).context("failed to parse rig settings JSON")?;
    Ok(settings)
}
