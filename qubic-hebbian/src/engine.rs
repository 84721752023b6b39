use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use qubic_core::config::HebbianConfig;
use qubic_core::constants::ALIVE_WEIGHT_THRESHOLD;
use qubic_core::model::{Matrix, Synapse};

use crate::clustering;
use crate::tuning;

/// Synapses at or above this weight participate in bulk reorganization.
const REORG_WEIGHT_FLOOR: f64 = 0.3;

/// Bulk reorg moves pairs by `weight * REORG_STRENGTH`.
const REORG_STRENGTH: f64 = 0.05;

/// The Hebbian learning engine for one matrix.
///
/// Borrows the matrix it mutates; the owning worker decides when the
/// engine runs. Position updates are dispatched to detached tasks so a hot
/// write path never waits on spatial reorganization.
pub struct HebbianEngine {
    matrix: Arc<RwLock<Matrix>>,
    cfg: RwLock<HebbianConfig>,
    /// NeuronID -> last fire time, garbage-collected past 2x the window.
    recent_fires: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl HebbianEngine {
    pub fn new(matrix: Arc<RwLock<Matrix>>, cfg: HebbianConfig) -> Self {
        Self {
            matrix,
            cfg: RwLock::new(cfg),
            recent_fires: Mutex::new(HashMap::new()),
        }
    }

    /// Current learning parameters (self-tune mutates them over time).
    pub fn config(&self) -> HebbianConfig {
        self.cfg.read().clone()
    }

    /// Notify the engine that a neuron fired now.
    pub fn on_neuron_fired(&self, neuron_id: &str) {
        self.on_neuron_fired_at(neuron_id, Utc::now());
    }

    /// Notify the engine of a fire at an explicit time. Every id seen in
    /// the co-activation window gets strengthened-or-created against the
    /// firing neuron.
    pub fn on_neuron_fired_at(&self, neuron_id: &str, now: DateTime<Utc>) {
        let window = Duration::milliseconds(self.cfg.read().coactivation_window_ms as i64);
        let co_activated: Vec<String> = {
            let mut fires = self.recent_fires.lock();
            let horizon = now - window;
            let partners = fires
                .iter()
                .filter(|(id, t)| id.as_str() != neuron_id && **t >= horizon)
                .map(|(id, _)| id.clone())
                .collect();
            fires.insert(neuron_id.to_string(), now);
            let gc_horizon = now - window * 2;
            fires.retain(|_, t| *t >= gc_horizon);
            partners
        };

        for partner in co_activated {
            self.strengthen_or_create(neuron_id, &partner, now);
        }
    }

    /// Strengthen the synapse joining `x` and `y`, creating it when both
    /// endpoints still have formation headroom.
    fn strengthen_or_create(&self, x: &str, y: &str, now: DateTime<Utc>) {
        if x == y {
            return;
        }
        let cfg = self.cfg.read().clone();

        let existing = self.matrix.read().synapse_between(x, y);
        if let Some(handle) = existing {
            let delta = handle.write().strengthen(cfg.learning_rate, now);
            self.spawn_pair_update(x.to_string(), y.to_string(), 0.1 * delta);
            return;
        }

        let mut m = self.matrix.write();
        // Double-check: another co-fire may have formed the link while we
        // were waiting for the write lock.
        if m.synapse_between(x, y).is_some() {
            return;
        }
        if m.neuron(x).is_none() || m.neuron(y).is_none() {
            return;
        }
        if m.degree(x) >= cfg.max_synapses_per_neuron || m.degree(y) >= cfg.max_synapses_per_neuron
        {
            return;
        }
        match m.insert_synapse(Synapse::new(x, y, cfg.min_weight_to_form)) {
            Ok(_) => tracing::debug!("synapse formed: {x} <-> {y}"),
            Err(e) => tracing::warn!("synapse formation failed: {e}"),
        }
    }

    /// Decay every synapse's weight, time-proportionally. Snapshot under
    /// the read lock, mutate through per-synapse locks only.
    pub fn decay_all(&self) {
        let rate = self.cfg.read().forgetting_rate;
        let now = Utc::now();
        let handles = self.matrix.read().synapse_handles();
        for (_, handle) in handles {
            handle.write().decay(rate, now);
        }
    }

    /// Remove every synapse whose weight fell below the alive threshold.
    /// Returns the number removed.
    pub fn prune_dead_synapses(&self) -> usize {
        let mut m = self.matrix.write();
        let dead: Vec<String> = m
            .synapse_handles()
            .into_iter()
            .filter(|(_, h)| h.read().weight < ALIVE_WEIGHT_THRESHOLD)
            .map(|(id, _)| id)
            .collect();
        let mut removed = 0;
        for id in dead {
            if m.remove_synapse(&id) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("pruned {removed} dead synapses");
        }
        removed
    }

    /// Bulk spatial reorganization: every strong synapse pulls its pair
    /// together. The synapse snapshot is taken under the read lock; the
    /// position updates run outside it.
    pub fn update_fractal_clusters(&self) {
        let pairs: Vec<(String, String, f64)> = {
            let m = self.matrix.read();
            m.synapse_handles()
                .into_iter()
                .filter_map(|(_, h)| {
                    let s = h.read();
                    (s.weight > REORG_WEIGHT_FLOOR)
                        .then(|| (s.from_id.clone(), s.to_id.clone(), s.weight))
                })
                .collect()
        };
        for (from, to, weight) in pairs {
            clustering::update_pair(&self.matrix, &from, &to, weight * REORG_STRENGTH);
        }
    }

    /// Run one fractal update for a pair immediately (test hook; the write
    /// path uses the detached-task variant).
    pub fn update_pair_now(&self, a: &str, b: &str, strength: f64) {
        clustering::update_pair(&self.matrix, a, b, strength);
    }

    /// Adjust learning parameters from the observed connectivity.
    pub fn self_tune(&self) {
        let (neurons, synapses) = {
            let m = self.matrix.read();
            (m.neuron_count(), m.synapse_count())
        };
        let mut cfg = self.cfg.write();
        tuning::self_tune(&mut cfg, neurons, synapses);
    }

    fn spawn_pair_update(&self, a: String, b: String, strength: f64) {
        let matrix = Arc::clone(&self.matrix);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                clustering::update_pair(&matrix, &a, &b, strength);
            });
        } else {
            // No runtime (synchronous tests): apply inline.
            clustering::update_pair(&matrix, &a, &b, strength);
        }
    }
}
