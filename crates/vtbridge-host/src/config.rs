use serde::{Deserialize, Serialize};
use vtbridge_error::{Result, VtabError};

/// Configuration for a [`VtabBridge`](crate::VtabBridge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Wrap every table/cursor callback in `catch_unwind`.
    pub catch_panics: bool,
    /// Parse the declared column list before accepting a create/connect.
    pub validate_declarations: bool,
    /// Reject `filter` calls whose argument count differs from the chosen
    /// plan; when off, missing arguments read as NULL and extras are
    /// dropped.
    pub strict_filter_arguments: bool,
    /// Refuse `open` once this many cursors are live. `0` = unlimited.
    pub max_open_cursors: usize,
    /// Maintain the per-bridge call counters.
    pub record_metrics: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            validate_declarations: true,
            strict_filter_arguments: true,
            max_open_cursors: 0,
            record_metrics: true,
        }
    }
}

impl BridgeConfig {
    /// Load from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VtabError::misuse(format!("invalid bridge configuration: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VtabError::internal(e.to_string()))
    }
}
