use serde::Deserialize;

use crate::error::EngineError;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;
pub const DEFAULT_PRESET_PREFIX: &str = "gridstage.presets";

/// How a batch of remote writes reacts to a failing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first failure; later records are not attempted.
    #[default]
    FailFast,
    /// Attempt every record and aggregate the failures.
    ContinueOnError,
}

/// What to do with a fetched collection that arrives while edits are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Hold the fetched collection until the grid is clean again.
    #[default]
    Defer,
    /// Replace the snapshot now and re-apply pending edits on top of it.
    Rebase,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub batch_policy: BatchPolicy,
    pub refresh_policy: RefreshPolicy,
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_policy: BatchPolicy::FailFast,
            refresh_policy: RefreshPolicy::Defer,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, EngineError> {
        serde_json::from_str(s).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    pub storage_prefix: String,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            storage_prefix: DEFAULT_PRESET_PREFIX.to_string(),
        }
    }
}

impl PresetConfig {
    pub fn from_json_str(s: &str) -> Result<Self, EngineError> {
        serde_json::from_str(s).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Presets are stored per view and per user.
    pub fn storage_key(&self, view: &str, user: &str) -> String {
        format!("{}:{view}:{user}", self.storage_prefix)
    }
}
