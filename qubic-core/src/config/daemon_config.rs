use serde::{Deserialize, Serialize};

/// Initial intervals for the five maintenance loops. All of them are
/// runtime-mutable on the daemon manager afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub decay_interval_ms: u64,
    pub consolidate_interval_ms: u64,
    pub prune_interval_ms: u64,
    pub persist_interval_ms: u64,
    pub reorg_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            decay_interval_ms: 60 * 1000,
            consolidate_interval_ms: 5 * 60 * 1000,
            prune_interval_ms: 10 * 60 * 1000,
            persist_interval_ms: 30 * 1000,
            reorg_interval_ms: 15 * 60 * 1000,
        }
    }
}
