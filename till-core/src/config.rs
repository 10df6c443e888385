//! Engine configuration

use serde::Deserialize;
use std::time::Duration;

/// Default debounce window for search/lookup fields
const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Tunable engine parameters, deserializable from the host's config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Debounce window for customer search and id lookup, milliseconds
    pub debounce_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl EngineConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}
