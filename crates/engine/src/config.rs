//! Tuning knobs for the engine.

use std::time::Duration;

use adapters::AdapterSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for a whole run, in seconds.
    pub run_timeout_secs: u64,
    /// Upper bound on the items a single `flow.iterate` may loop over.
    pub max_loop_iterations: usize,
    /// Keep the JSON type of fields that are exactly one placeholder.
    pub preserve_placeholder_types: bool,
    /// Admitted invocations per workflow per minute.
    pub rate_limit_per_minute: u32,
    /// Provider endpoints and the per-call HTTP timeout.
    pub adapters: AdapterSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: 300,
            max_loop_iterations: 1000,
            preserve_placeholder_types: false,
            rate_limit_per_minute: 100,
            adapters: AdapterSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "max_loop_iterations": 10, "adapters": { "timeout_secs": 3 } }"#)
                .unwrap();
        assert_eq!(config.max_loop_iterations, 10);
        assert_eq!(config.run_timeout(), Duration::from_secs(300));
        assert_eq!(config.adapters.timeout(), Duration::from_secs(3));
        assert!(!config.preserve_placeholder_types);
    }
}
