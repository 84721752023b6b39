use serde::{Deserialize, Serialize};

use crate::constants;

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers idle longer than this are evicted (persist + drop).
    pub max_idle_ms: u64,
    /// Eviction loop tick.
    pub eviction_tick_ms: u64,
    /// Neuron capacity applied to newly created matrices.
    pub max_neurons: usize,
    /// Maximum content size accepted by Write, in bytes.
    pub content_limit: usize,
    /// Per-worker operation queue capacity.
    pub queue_capacity: usize,
    /// Lexical/embedding blend factor for search.
    pub search_alpha: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_ms: 30 * 60 * 1000,
            eviction_tick_ms: 60 * 1000,
            max_neurons: constants::DEFAULT_MAX_NEURONS,
            content_limit: constants::DEFAULT_CONTENT_LIMIT,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            search_alpha: constants::DEFAULT_SEARCH_ALPHA,
        }
    }
}
