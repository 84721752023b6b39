use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ALIVE_WEIGHT_THRESHOLD, DEFAULT_BASE_ENERGY, DORMANT_ENERGY_THRESHOLD, FIRE_ENERGY_BOOST,
};

/// One text memory unit: content plus activation state and a spatial
/// position inside its matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neuron {
    /// UUID v4 identifier, stable for the neuron's lifetime.
    pub id: String,
    /// UTF-8 memory content, non-empty after trim.
    pub content: String,
    /// blake3 hash of content, used for deduplication.
    pub content_hash: String,
    /// Position in [-1,1]^current_dim.
    pub position: Vec<f64>,
    /// Activation energy, always within [base_energy, 1].
    pub energy: f64,
    /// Floor below which energy never decays.
    pub base_energy: f64,
    /// Consolidation level; 0 is surface memory.
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: DateTime<Utc>,
    pub last_decay_at: DateTime<Utc>,
    /// Monotonically non-decreasing access counter.
    pub access_count: u64,
    pub tags: Vec<String>,
    #[serde(default)]
    pub sentiment_label: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Neuron {
    /// Create a fresh neuron at the given position. New memories start hot.
    pub fn new(content: impl Into<String>, position: Vec<f64>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: Self::compute_content_hash(&content),
            content,
            position,
            energy: 1.0,
            base_energy: DEFAULT_BASE_ENERGY,
            depth: 0,
            created_at: now,
            last_fired_at: now,
            last_decay_at: now,
            access_count: 0,
            tags: Vec::new(),
            sentiment_label: None,
            sentiment_score: None,
            embedding: None,
        }
    }

    /// blake3 hex digest of the raw content bytes.
    pub fn compute_content_hash(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex().to_string()
    }

    /// Record an activation: boost energy, bump the access counter.
    pub fn fire(&mut self, now: DateTime<Utc>) {
        self.energy = (self.energy + FIRE_ENERGY_BOOST).min(1.0);
        self.access_count += 1;
        self.last_fired_at = now;
    }

    /// Time-proportional energy decay. The reference point is the neuron's
    /// own last decay tick, not its last fire, so long-idle neurons do not
    /// compound across repeated sweeps.
    pub fn decay(&mut self, rate_per_hour: f64, now: DateTime<Utc>) {
        let hours = (now - self.last_decay_at).num_milliseconds() as f64 / 3_600_000.0;
        if hours > 0.0 {
            self.energy = (self.energy - rate_per_hour * hours).max(self.base_energy);
        }
        self.last_decay_at = now;
    }

    /// Replace the content, recomputing the hash.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.content_hash = Self::compute_content_hash(&self.content);
    }

    /// Whether this neuron is energetic enough to appear in search results.
    pub fn is_alive(&self) -> bool {
        self.energy > ALIVE_WEIGHT_THRESHOLD
    }

    /// Whether this neuron has cooled to the point of removal by `Prune`.
    pub fn is_dormant(&self) -> bool {
        self.energy <= DORMANT_ENERGY_THRESHOLD
    }
}
