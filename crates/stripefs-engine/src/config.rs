//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the request engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name/label for this engine instance, used in log lines.
    pub name: String,
    /// Log every state entry at debug level.
    pub trace_states: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name: "stripefs-engine".to_string(),
            trace_states: true,
        }
    }
}
