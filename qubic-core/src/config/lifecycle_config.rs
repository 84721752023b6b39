use serde::{Deserialize, Serialize};

/// Lifecycle manager thresholds and sampling windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Quiet time before Active demotes to Idle.
    pub idle_threshold_ms: u64,
    /// Quiet time before Idle demotes to Sleeping.
    pub sleep_threshold_ms: u64,
    /// Quiet time before Sleeping demotes to Dormant.
    pub dormant_threshold_ms: u64,
    /// Background monitor tick.
    pub check_interval_ms: u64,
    /// Activity samples older than this are evicted.
    pub buffer_window_ms: u64,
    /// Sparseness sampling window.
    pub sparseness_window_ms: u64,
    /// Fewer ops than this inside the window means sparse.
    pub sparseness_min_ops: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 5 * 60 * 1000,
            sleep_threshold_ms: 30 * 60 * 1000,
            dormant_threshold_ms: 2 * 60 * 60 * 1000,
            check_interval_ms: 30 * 1000,
            buffer_window_ms: 5 * 60 * 1000,
            sparseness_window_ms: 30 * 1000,
            sparseness_min_ops: 3,
        }
    }
}
