//! Fractal spatial clustering: pairwise attraction toward the midpoint,
//! a pull toward each endpoint's neighbourhood centroid, and repulsion of
//! a few unconnected neurons.
//!
//! Lock discipline: everything needed is collected and snapshotted under
//! the matrix read lock, which is released before any neuron write lock is
//! taken. When two neurons are locked together they are locked in
//! ascending id order.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use qubic_core::model::{Matrix, Neuron};

/// How many unconnected neurons get pushed away per update.
const REPULSION_FAN_OUT: usize = 5;

type NeuronHandle = Arc<RwLock<Neuron>>;

struct PairSnapshot {
    a: NeuronHandle,
    b: NeuronHandle,
    a_first: bool,
    a_centroid: Option<Vec<f64>>,
    b_centroid: Option<Vec<f64>>,
    repelled: Vec<NeuronHandle>,
}

/// Apply one fractal update to the pair `(a, b)` with the given strength.
pub fn update_pair(matrix: &Arc<RwLock<Matrix>>, a: &str, b: &str, strength: f64) {
    if a == b || strength <= 0.0 {
        return;
    }

    // Read phase: pointers and position snapshots only.
    let snap = {
        let m = matrix.read();
        let (Some(a_handle), Some(b_handle)) = (m.neuron(a), m.neuron(b)) else {
            return;
        };
        let a_neighbors: HashSet<String> = m.neighbors(a).into_iter().collect();
        let mut repelled = Vec::with_capacity(REPULSION_FAN_OUT);
        for id in m.neuron_ids() {
            if repelled.len() >= REPULSION_FAN_OUT {
                break;
            }
            if id == a || id == b || a_neighbors.contains(&id) {
                continue;
            }
            if let Some(h) = m.neuron(&id) {
                repelled.push(h);
            }
        }
        PairSnapshot {
            a_first: a <= b,
            a_centroid: neighborhood_centroid(&m, a),
            b_centroid: neighborhood_centroid(&m, b),
            a: a_handle,
            b: b_handle,
            repelled,
        }
    };
    // Matrix lock released; only per-neuron locks from here on.

    // Pairwise attraction: both endpoints locked together, id order.
    {
        let (first, second) = if snap.a_first {
            (&snap.a, &snap.b)
        } else {
            (&snap.b, &snap.a)
        };
        let mut f = first.write();
        let mut s = second.write();
        let dims = f.position.len().min(s.position.len());
        for i in 0..dims {
            let mid = (f.position[i] + s.position[i]) / 2.0;
            f.position[i] = clamp_unit(f.position[i] + (mid - f.position[i]) * strength);
            s.position[i] = clamp_unit(s.position[i] + (mid - s.position[i]) * strength);
        }
    }

    // Centroid pull, one endpoint lock at a time.
    for (handle, centroid) in [(&snap.a, &snap.a_centroid), (&snap.b, &snap.b_centroid)] {
        if let Some(centroid) = centroid {
            let mut n = handle.write();
            let dims = n.position.len().min(centroid.len());
            for i in 0..dims {
                n.position[i] =
                    clamp_unit(n.position[i] + (centroid[i] - n.position[i]) * strength * 0.5);
            }
        }
    }

    // Inter-cluster repulsion, against a position snapshot of `a` so only
    // one neuron lock is ever held.
    let anchor = snap.a.read().position.clone();
    for handle in &snap.repelled {
        let mut n = handle.write();
        let dims = n.position.len().min(anchor.len());
        for i in 0..dims {
            let away = n.position[i] - anchor[i];
            n.position[i] = clamp_unit(n.position[i] + away * strength * 0.3);
        }
    }
}

/// Mean position of a neuron's current neighbourhood, if it has one.
/// Called under the matrix read lock; takes neighbour read locks briefly.
fn neighborhood_centroid(m: &Matrix, id: &str) -> Option<Vec<f64>> {
    let neighbors = m.neighbors(id);
    if neighbors.is_empty() {
        return None;
    }
    let mut sum: Vec<f64> = vec![0.0; m.current_dim];
    let mut count = 0usize;
    for nid in &neighbors {
        if let Some(h) = m.neuron(nid) {
            let n = h.read();
            for (i, v) in n.position.iter().take(sum.len()).enumerate() {
                sum[i] += v;
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    for v in &mut sum {
        *v /= count as f64;
    }
    Some(sum)
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}
