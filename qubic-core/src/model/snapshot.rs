use serde::{Deserialize, Serialize};

/// Per-tenant summary stored in the checkpoint index. Cheap to produce,
/// cheap to scan at boot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixSnapshot {
    pub index_id: String,
    pub version: u64,
    pub neuron_count: usize,
    pub synapse_count: usize,
    pub current_dim: usize,
    pub total_energy: f64,
    pub modified_at_unix: i64,
}
