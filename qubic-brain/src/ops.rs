//! Typed operation payloads and results. These shapes are the contract the
//! HTTP surface and MCP adapter build on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qubic_core::model::Neuron;

/// Payload for `Write`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNeuron {
    pub content: String,
    /// New neurons are placed near their parent when one is given.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub base_energy: Option<f64>,
}

/// Payload for `Search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Graph-spread hops from the top hits.
    #[serde(default)]
    pub depth: u32,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Tag filter. With `strict` it intersects; without, it boosts.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub strict: bool,
}

fn default_search_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn simple(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            depth: 0,
            limit: default_search_limit(),
            tags: Vec::new(),
            strict: false,
        }
    }
}

/// Payload for `Touch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNeuron {
    pub id: String,
    pub content: String,
}

/// Payload for `Recall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNeurons {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Only neurons consolidated at least this deep.
    #[serde(default)]
    pub min_depth: Option<u32>,
}

impl Default for ListNeurons {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_search_limit(),
            min_depth: None,
        }
    }
}

/// Everything a worker can be asked to do.
#[derive(Debug, Clone)]
pub enum Operation {
    Write(AddNeuron),
    Read { id: String },
    Search(SearchRequest),
    Touch(UpdateNeuron),
    Forget { id: String },
    Recall(ListNeurons),
    Fire { id: String },
    Decay,
    Consolidate,
    Prune,
    Reorg,
    GetStats,
    Shutdown,
}

/// Caller-facing snapshot of one neuron.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuronView {
    pub id: String,
    pub content: String,
    pub content_hash: String,
    pub energy: f64,
    pub base_energy: f64,
    pub depth: u32,
    pub position: Vec<f64>,
    pub access_count: u64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: DateTime<Utc>,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
}

impl From<&Neuron> for NeuronView {
    fn from(n: &Neuron) -> Self {
        Self {
            id: n.id.clone(),
            content: n.content.clone(),
            content_hash: n.content_hash.clone(),
            energy: n.energy,
            base_energy: n.base_energy,
            depth: n.depth,
            position: n.position.clone(),
            access_count: n.access_count,
            tags: n.tags.clone(),
            created_at: n.created_at,
            last_fired_at: n.last_fired_at,
            sentiment_label: n.sentiment_label.clone(),
            sentiment_score: n.sentiment_score,
        }
    }
}

/// One scored search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub neuron: NeuronView,
    /// Relevance in [0,1].
    pub score: f64,
    /// Graph distance from the lexical hit that reached it; 0 for direct.
    pub hops: u32,
}

/// Worker statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStats {
    pub index_id: String,
    pub neuron_count: usize,
    pub synapse_count: usize,
    pub total_energy: f64,
    pub avg_energy: f64,
    pub current_dim: usize,
    pub version: u64,
    pub total_activations: u64,
    pub last_activity: DateTime<Utc>,
    /// Unix millis of the last handled operation; drives idle eviction.
    pub last_op_unix_ms: i64,
}

/// Typed result of one operation.
#[derive(Debug, Clone)]
pub enum OpOutput {
    Neuron(NeuronView),
    Neurons(Vec<NeuronView>),
    Hits(Vec<SearchHit>),
    Count(usize),
    Stats(WorkerStats),
    Done,
}
