//! Search scoring: lexical token overlap blended with embedding cosine,
//! then weight-gated BFS spread over the adjacency graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use qubic_core::model::Matrix;

use crate::ops::{NeuronView, SearchHit, SearchRequest};

/// Per-hop score attenuation during graph spread.
const HOP_ATTENUATION: f64 = 0.8;

/// Score boost for a non-strict tag match, scaled by the matched fraction.
const TAG_BOOST: f64 = 0.1;

/// Run a search against the matrix. `query_embedding` comes from the
/// worker's vectorizer when one is wired.
pub fn search(
    matrix: &Arc<RwLock<Matrix>>,
    req: &SearchRequest,
    alpha: f64,
    query_embedding: Option<&[f32]>,
) -> Vec<SearchHit> {
    let m = matrix.read();
    let query_tokens = tokenize(&req.query);
    let query_lower = req.query.to_lowercase();

    // Phase 1: score every live neuron lexically (+ cosine when possible).
    let mut scored: Vec<SearchHit> = Vec::new();
    for (_, handle) in m.neuron_handles() {
        let n = handle.read();
        if !n.is_alive() {
            continue;
        }
        let matched_tags = if req.tags.is_empty() {
            0
        } else {
            req.tags.iter().filter(|t| n.tags.contains(t)).count()
        };
        if req.strict && matched_tags < req.tags.len() {
            continue;
        }

        let lexical = lexical_score(&query_tokens, &query_lower, &n.content);
        let mut score = match (query_embedding, n.embedding.as_deref()) {
            (Some(q), Some(e)) => (1.0 - alpha) * lexical + alpha * cosine(q, e),
            _ => lexical,
        };
        if !req.strict && !req.tags.is_empty() {
            score += TAG_BOOST * matched_tags as f64 / req.tags.len() as f64;
        }
        let score = score.clamp(0.0, 1.0);
        if score <= 0.0 {
            continue;
        }
        scored.push(SearchHit {
            neuron: NeuronView::from(&*n),
            score,
            hops: 0,
        });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(req.limit.max(1));

    // Phase 2: spread from the top hits over weight-gated edges.
    if req.depth > 0 {
        let link_threshold = m.params.link_threshold;
        let mut seen: HashSet<String> = scored.iter().map(|h| h.neuron.id.clone()).collect();
        let mut frontier: VecDeque<(String, f64, u32)> = scored
            .iter()
            .map(|h| (h.neuron.id.clone(), h.score, 0))
            .collect();
        let mut spread: HashMap<String, SearchHit> = HashMap::new();

        while let Some((id, score, hops)) = frontier.pop_front() {
            if hops >= req.depth {
                continue;
            }
            for neighbor in m.neighbors(&id) {
                if seen.contains(&neighbor) {
                    continue;
                }
                let Some(syn) = m.synapse_between(&id, &neighbor) else {
                    continue;
                };
                let weight = syn.read().weight;
                if weight < link_threshold {
                    continue;
                }
                let Some(handle) = m.neuron(&neighbor) else {
                    continue;
                };
                let n = handle.read();
                if !n.is_alive() {
                    continue;
                }
                let neighbor_score = (score * weight * HOP_ATTENUATION).clamp(0.0, 1.0);
                seen.insert(neighbor.clone());
                frontier.push_back((neighbor.clone(), neighbor_score, hops + 1));
                spread.insert(
                    neighbor,
                    SearchHit {
                        neuron: NeuronView::from(&*n),
                        score: neighbor_score,
                        hops: hops + 1,
                    },
                );
            }
        }
        scored.extend(spread.into_values());
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(req.limit.max(1));
    }

    scored
}

/// Token overlap with a substring bonus, clamped to [0,1].
fn lexical_score(query_tokens: &[String], query_lower: &str, content: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let content_tokens: HashSet<String> = tokenize(&content_lower).into_iter().collect();
    let overlap = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    let mut score = overlap as f64 / query_tokens.len() as f64;
    if !query_lower.is_empty() && content_lower.contains(query_lower) {
        score += 0.3;
    }
    score.clamp(0.0, 1.0)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cosine similarity mapped into [0,1].
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dims = a.len().min(b.len());
    if dims == 0 {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for i in 0..dims {
        dot += f64::from(a[i]) * f64::from(b[i]);
        na += f64::from(a[i]).powi(2);
        nb += f64::from(b[i]).powi(2);
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    ((sim + 1.0) / 2.0).clamp(0.0, 1.0)
}
