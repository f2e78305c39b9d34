//! Serializable mid-session state.
//!
//! A snapshot carries everything the strategy loop mutates between bars.
//! Restoring it under the same configuration and feeding the remaining bars
//! produces the same decisions as an uninterrupted run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PositionState;
use crate::indicators::OiHistory;
use crate::risk::RiskState;

use super::strategy_loop::{LastBar, PendingOrder};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub schema_version: u32,
    /// Hash of the configuration the snapshot was taken under.
    pub config_hash: String,
    pub history: OiHistory,
    #[serde(default)]
    pub companion_history: OiHistory,
    pub position: PositionState,
    pub risk: RiskState,
    pub pending: Option<PendingOrder>,
    pub next_order_id: u64,
    pub last_bar: Option<LastBar>,
}

impl StrategySnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot schema version {found} is not supported (expected {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("snapshot was taken under config {found}, current config is {expected}")]
    ConfigMismatch { expected: String, found: String },

    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
