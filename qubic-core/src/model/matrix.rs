use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONSOL_FREQUENCY, DEFAULT_DECAY_RATE, DEFAULT_LINK_THRESHOLD, DEFAULT_MAX_DIM,
    DEFAULT_MAX_NEURONS, DEFAULT_MIN_DIM, DEFAULT_MIN_NEURONS,
};
use crate::errors::{QubicError, QubicResult};
use crate::model::snapshot::MatrixSnapshot;
use crate::model::synapse::synapse_id;
use crate::model::{Neuron, Synapse};

/// Dimensionality and population limits for one matrix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatrixBounds {
    pub min_dim: usize,
    pub max_dim: usize,
    pub min_neurons: usize,
    pub max_neurons: usize,
}

impl Default for MatrixBounds {
    fn default() -> Self {
        Self {
            min_dim: DEFAULT_MIN_DIM,
            max_dim: DEFAULT_MAX_DIM,
            min_neurons: DEFAULT_MIN_NEURONS,
            max_neurons: DEFAULT_MAX_NEURONS,
        }
    }
}

/// Parameters the Hebbian engine tunes at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LearnedParams {
    /// Energy decay rate, per hour.
    pub decay_rate: f64,
    /// Minimum synapse weight for search spread to follow an edge.
    pub link_threshold: f64,
    /// Consolidation frequency, in hours.
    pub consol_frequency: f64,
}

impl Default for LearnedParams {
    fn default() -> Self {
        Self {
            decay_rate: DEFAULT_DECAY_RATE,
            link_threshold: DEFAULT_LINK_THRESHOLD,
            consol_frequency: DEFAULT_CONSOL_FREQUENCY,
        }
    }
}

/// One tenant's full memory graph. Exclusively owned by at most one worker;
/// neurons and synapses sit behind their own locks so background position
/// updates never block the worker loop.
///
/// Lock order: matrix lock before any neuron or synapse lock, and two
/// neurons together only in ascending id order.
#[derive(Debug)]
pub struct Matrix {
    pub index_id: String,
    pub bounds: MatrixBounds,
    pub current_dim: usize,
    neurons: HashMap<String, Arc<RwLock<Neuron>>>,
    synapses: HashMap<String, Arc<RwLock<Synapse>>>,
    adjacency: HashMap<String, Vec<String>>,
    /// content_hash -> neuron id, maintained for O(1) deduplication.
    hash_index: HashMap<String, String>,
    pub params: LearnedParams,
    pub total_activations: u64,
    pub last_activity: DateTime<Utc>,
    pub last_consolidation: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Bumped on every structural change.
    pub version: u64,
}

impl Matrix {
    /// Create an empty matrix with default bounds and parameters.
    pub fn new(index_id: impl Into<String>) -> Self {
        Self::with_bounds(index_id, MatrixBounds::default())
    }

    /// Create an empty matrix with explicit bounds.
    pub fn with_bounds(index_id: impl Into<String>, bounds: MatrixBounds) -> Self {
        let now = Utc::now();
        Self {
            index_id: index_id.into(),
            bounds,
            current_dim: bounds.min_dim,
            neurons: HashMap::new(),
            synapses: HashMap::new(),
            adjacency: HashMap::new(),
            hash_index: HashMap::new(),
            params: LearnedParams::default(),
            total_activations: 0,
            last_activity: now,
            last_consolidation: now,
            created_at: now,
            modified_at: now,
            version: 0,
        }
    }

    /// Bump modified_at and the structural version.
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
        self.version += 1;
    }

    /// A uniformly random position in [-1,1]^current_dim.
    pub fn random_position(&self) -> Vec<f64> {
        let mut rng = rand::thread_rng();
        (0..self.current_dim).map(|_| rng.gen_range(-1.0..=1.0)).collect()
    }

    /// A position jittered around a parent's, clamped to the unit cube.
    pub fn position_near(&self, parent: &[f64]) -> Vec<f64> {
        let mut rng = rand::thread_rng();
        (0..self.current_dim)
            .map(|i| {
                let base = parent.get(i).copied().unwrap_or(0.0);
                (base + rng.gen_range(-0.1..=0.1)).clamp(-1.0, 1.0)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Neurons
    // ------------------------------------------------------------------

    /// Insert a neuron, enforcing capacity and position-length invariants.
    pub fn insert_neuron(&mut self, neuron: Neuron) -> QubicResult<Arc<RwLock<Neuron>>> {
        if self.neurons.len() >= self.bounds.max_neurons {
            return Err(QubicError::MatrixFull {
                capacity: self.bounds.max_neurons,
            });
        }
        if neuron.position.len() != self.current_dim {
            return Err(QubicError::invalid(format!(
                "position has {} components, matrix dimension is {}",
                neuron.position.len(),
                self.current_dim
            )));
        }
        let id = neuron.id.clone();
        self.hash_index.insert(neuron.content_hash.clone(), id.clone());
        self.adjacency.entry(id.clone()).or_default();
        let handle = Arc::new(RwLock::new(neuron));
        self.neurons.insert(id, handle.clone());
        self.touch();
        Ok(handle)
    }

    /// Look up a neuron handle by id.
    pub fn neuron(&self, id: &str) -> Option<Arc<RwLock<Neuron>>> {
        self.neurons.get(id).cloned()
    }

    /// Look up a neuron handle by content hash (deduplication path).
    pub fn neuron_by_hash(&self, content_hash: &str) -> Option<Arc<RwLock<Neuron>>> {
        let id = self.hash_index.get(content_hash)?;
        self.neurons.get(id).cloned()
    }

    /// Remove a neuron along with every incident synapse. Returns false if
    /// the id is unknown. Adjacency symmetry is preserved.
    pub fn remove_neuron(&mut self, id: &str) -> bool {
        let Some(handle) = self.neurons.remove(id) else {
            return false;
        };
        {
            let neuron = handle.read();
            self.hash_index.remove(&neuron.content_hash);
        }
        let neighbors = self.adjacency.remove(id).unwrap_or_default();
        for neighbor in neighbors {
            self.synapses.remove(&synapse_id(id, &neighbor));
            self.synapses.remove(&synapse_id(&neighbor, id));
            if let Some(list) = self.adjacency.get_mut(&neighbor) {
                list.retain(|n| n != id);
            }
        }
        self.touch();
        true
    }

    /// Snapshot of all neuron handles (id, handle).
    pub fn neuron_handles(&self) -> Vec<(String, Arc<RwLock<Neuron>>)> {
        self.neurons
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect()
    }

    pub fn neuron_ids(&self) -> Vec<String> {
        self.neurons.keys().cloned().collect()
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    /// Sum of all neuron energies. Takes each neuron's read lock briefly.
    pub fn total_energy(&self) -> f64 {
        self.neurons.values().map(|h| h.read().energy).sum()
    }

    // ------------------------------------------------------------------
    // Synapses & adjacency
    // ------------------------------------------------------------------

    /// Insert a synapse and register both adjacency directions.
    pub fn insert_synapse(&mut self, synapse: Synapse) -> QubicResult<Arc<RwLock<Synapse>>> {
        if synapse.from_id == synapse.to_id {
            return Err(QubicError::SelfLink {
                neuron_id: synapse.from_id,
            });
        }
        let (from, to, id) = (synapse.from_id.clone(), synapse.to_id.clone(), synapse.id.clone());
        let handle = Arc::new(RwLock::new(synapse));
        self.synapses.insert(id, handle.clone());
        let fwd = self.adjacency.entry(from.clone()).or_default();
        if !fwd.contains(&to) {
            fwd.push(to.clone());
        }
        let rev = self.adjacency.entry(to).or_default();
        if !rev.contains(&from) {
            rev.push(from);
        }
        self.touch();
        Ok(handle)
    }

    /// Find the synapse joining two neurons, checking both orientations.
    pub fn synapse_between(&self, a: &str, b: &str) -> Option<Arc<RwLock<Synapse>>> {
        self.synapses
            .get(&synapse_id(a, b))
            .or_else(|| self.synapses.get(&synapse_id(b, a)))
            .cloned()
    }

    /// Remove a synapse by id, scrubbing both adjacency directions.
    /// Returns false if the id is unknown.
    pub fn remove_synapse(&mut self, id: &str) -> bool {
        let Some(handle) = self.synapses.remove(id) else {
            return false;
        };
        let (from, to) = {
            let syn = handle.read();
            (syn.from_id.clone(), syn.to_id.clone())
        };
        if let Some(list) = self.adjacency.get_mut(&from) {
            list.retain(|n| n != &to);
        }
        if let Some(list) = self.adjacency.get_mut(&to) {
            list.retain(|n| n != &from);
        }
        self.touch();
        true
    }

    /// Snapshot of all synapse handles (id, handle).
    pub fn synapse_handles(&self) -> Vec<(String, Arc<RwLock<Synapse>>)> {
        self.synapses
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect()
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.len()
    }

    /// Cloned neighbor list for a neuron. Empty for unknown ids.
    pub fn neighbors(&self, id: &str) -> Vec<String> {
        self.adjacency.get(id).cloned().unwrap_or_default()
    }

    /// Degree of a neuron (number of adjacency entries).
    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map(|l| l.len()).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Snapshots & persistence form
    // ------------------------------------------------------------------

    /// Lightweight snapshot record for the store's checkpoint index.
    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            index_id: self.index_id.clone(),
            version: self.version,
            neuron_count: self.neurons.len(),
            synapse_count: self.synapses.len(),
            current_dim: self.current_dim,
            total_energy: self.total_energy(),
            modified_at_unix: self.modified_at.timestamp(),
        }
    }

    /// Deep copy into the plain persistence form, deterministically ordered.
    pub fn snapshot_data(&self) -> MatrixData {
        let mut neurons: Vec<Neuron> = self.neurons.values().map(|h| h.read().clone()).collect();
        neurons.sort_by(|a, b| a.id.cmp(&b.id));
        let mut synapses: Vec<Synapse> = self.synapses.values().map(|h| h.read().clone()).collect();
        synapses.sort_by(|a, b| a.id.cmp(&b.id));
        MatrixData {
            index_id: self.index_id.clone(),
            bounds: self.bounds,
            current_dim: self.current_dim,
            neurons,
            synapses,
            adjacency: self.adjacency.clone(),
            params: self.params,
            total_activations: self.total_activations,
            last_activity: self.last_activity,
            last_consolidation: self.last_consolidation,
            created_at: self.created_at,
            modified_at: self.modified_at,
            version: self.version,
        }
    }

    /// Rebuild the runtime graph from its persistence form.
    pub fn from_data(data: MatrixData) -> Self {
        let mut neurons = HashMap::with_capacity(data.neurons.len());
        let mut hash_index = HashMap::with_capacity(data.neurons.len());
        let mut adjacency = data.adjacency;
        for neuron in data.neurons {
            hash_index.insert(neuron.content_hash.clone(), neuron.id.clone());
            adjacency.entry(neuron.id.clone()).or_default();
            neurons.insert(neuron.id.clone(), Arc::new(RwLock::new(neuron)));
        }
        let mut synapses = HashMap::with_capacity(data.synapses.len());
        for synapse in data.synapses {
            synapses.insert(synapse.id.clone(), Arc::new(RwLock::new(synapse)));
        }
        Self {
            index_id: data.index_id,
            bounds: data.bounds,
            current_dim: data.current_dim,
            neurons,
            synapses,
            adjacency,
            hash_index,
            params: data.params,
            total_activations: data.total_activations,
            last_activity: data.last_activity,
            last_consolidation: data.last_consolidation,
            created_at: data.created_at,
            modified_at: data.modified_at,
            version: data.version,
        }
    }
}

/// Plain serializable form of a matrix. Structural equality of two matrices
/// is equality of their `MatrixData`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixData {
    pub index_id: String,
    #[serde(default)]
    pub bounds: MatrixBounds,
    pub current_dim: usize,
    pub neurons: Vec<Neuron>,
    pub synapses: Vec<Synapse>,
    pub adjacency: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub params: LearnedParams,
    #[serde(default)]
    pub total_activations: u64,
    pub last_activity: DateTime<Utc>,
    pub last_consolidation: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version: u64,
}
