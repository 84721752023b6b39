use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ALIVE_WEIGHT_THRESHOLD;

/// A weighted bidirectional link between two neurons. Strengthens when its
/// endpoints co-fire, decays with disuse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Synapse {
    /// `from:to` concatenation; the unordered pair is unique regardless of
    /// orientation.
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    /// Link weight, clamped to [0,1].
    pub weight: f64,
    /// Monotonic co-fire counter.
    pub co_fire_count: u64,
    pub last_co_fire: DateTime<Utc>,
    /// Always true for links formed by the built-in engine.
    pub bidirectional: bool,
    pub created_at: DateTime<Utc>,
    /// Last decay tick. Absent in frames written before the field existed;
    /// decode falls back to `last_co_fire`.
    #[serde(default)]
    pub last_decay_at: Option<DateTime<Utc>>,
}

impl Synapse {
    /// Create a new synapse with the given initial weight.
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, weight: f64) -> Self {
        let from_id = from_id.into();
        let to_id = to_id.into();
        let now = Utc::now();
        Self {
            id: synapse_id(&from_id, &to_id),
            from_id,
            to_id,
            weight: weight.clamp(0.0, 1.0),
            co_fire_count: 0,
            last_co_fire: now,
            bidirectional: true,
            created_at: now,
            last_decay_at: Some(now),
        }
    }

    /// Strengthen asymptotically toward 1.0. Returns the applied delta.
    pub fn strengthen(&mut self, learning_rate: f64, now: DateTime<Utc>) -> f64 {
        let delta = learning_rate * (1.0 - self.weight);
        self.weight = (self.weight + delta).clamp(0.0, 1.0);
        self.co_fire_count += 1;
        self.last_co_fire = now;
        delta
    }

    /// Time-proportional weight decay, measured from the synapse's own last
    /// decay tick so repeated sweeps do not compound.
    pub fn decay(&mut self, rate_per_hour: f64, now: DateTime<Utc>) {
        let reference = self.last_decay_at.unwrap_or(self.last_co_fire);
        let hours = (now - reference).num_milliseconds() as f64 / 3_600_000.0;
        if hours > 0.0 {
            self.weight = (self.weight - rate_per_hour * hours).clamp(0.0, 1.0);
        }
        self.last_decay_at = Some(now);
    }

    /// A synapse below the alive threshold is dead and eligible for pruning.
    pub fn is_alive(&self) -> bool {
        self.weight >= ALIVE_WEIGHT_THRESHOLD
    }

    /// True if this synapse joins the given pair, in either orientation.
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.from_id == a && self.to_id == b) || (self.from_id == b && self.to_id == a)
    }
}

/// Canonical synapse id for an ordered endpoint pair.
pub fn synapse_id(from: &str, to: &str) -> String {
    format!("{from}:{to}")
}
