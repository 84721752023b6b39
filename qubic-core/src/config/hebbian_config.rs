use serde::{Deserialize, Serialize};

use crate::constants;

/// Hebbian learning engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HebbianConfig {
    /// Two fires within this window count as co-activation.
    pub coactivation_window_ms: u64,
    /// Fraction of remaining headroom gained per co-fire.
    pub learning_rate: f64,
    /// Synapse weight lost per idle hour.
    pub forgetting_rate: f64,
    /// Initial weight of newly formed synapses.
    pub min_weight_to_form: f64,
    /// Formation stops once a neuron has this many neighbours.
    pub max_synapses_per_neuron: usize,
    /// Consolidation gate: minimum access count.
    pub consolidation_access_threshold: u64,
    /// Consolidation gate: minimum age in hours.
    pub consolidation_age_hours: i64,
    /// Consolidation gate: energy must have cooled below this.
    pub consolidation_energy_ceiling: f64,
}

impl Default for HebbianConfig {
    fn default() -> Self {
        Self {
            coactivation_window_ms: constants::DEFAULT_COACTIVATION_WINDOW_MS,
            learning_rate: constants::DEFAULT_LEARNING_RATE,
            forgetting_rate: constants::DEFAULT_FORGETTING_RATE,
            min_weight_to_form: constants::DEFAULT_MIN_WEIGHT_TO_FORM,
            max_synapses_per_neuron: constants::DEFAULT_MAX_SYNAPSES_PER_NEURON,
            consolidation_access_threshold: constants::CONSOLIDATION_ACCESS_THRESHOLD,
            consolidation_age_hours: constants::CONSOLIDATION_AGE_HOURS,
            consolidation_energy_ceiling: constants::CONSOLIDATION_ENERGY_CEILING,
        }
    }
}
