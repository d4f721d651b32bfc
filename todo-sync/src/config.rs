//! Session configuration. Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::theme::Theme;

/// What the reconciler does with notifications that arrive before its first snapshot has been applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreSnapshotPolicy {
    /// Hold them and replay them, in arrival order, on top of the snapshot.
    #[default]
    Buffer,
    /// Apply them right away; the snapshot then replaces the collection wholesale.
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub pre_snapshot: PreSnapshotPolicy,
    /// Upper bound on buffered notifications; the oldest is dropped beyond it.
    pub max_pending_events: usize,
    pub default_theme: Theme,
    /// Address of the todo contract. The sync core never reads it; the host uses it to build its event source.
    pub contract_address: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pre_snapshot: PreSnapshotPolicy::Buffer,
            max_pending_events: 256,
            default_theme: Theme::Dark,
            contract_address: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid sync configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
