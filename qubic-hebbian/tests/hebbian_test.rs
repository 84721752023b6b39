//! Co-activation, plasticity, clustering, and pruning tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;

use qubic_core::config::HebbianConfig;
use qubic_core::model::{Matrix, Neuron, Synapse};
use qubic_hebbian::HebbianEngine;

fn matrix_with_neurons(contents: &[&str]) -> (Arc<RwLock<Matrix>>, Vec<String>) {
    let mut m = Matrix::new("hebbian-test");
    let mut ids = Vec::new();
    for c in contents {
        let n = Neuron::new(*c, vec![0.0; m.current_dim]);
        ids.push(n.id.clone());
        m.insert_neuron(n).unwrap();
    }
    (Arc::new(RwLock::new(m)), ids)
}

fn engine(matrix: Arc<RwLock<Matrix>>) -> HebbianEngine {
    HebbianEngine::new(matrix, HebbianConfig::default())
}

#[test]
fn co_firing_within_window_forms_one_synapse() {
    let (matrix, ids) = matrix_with_neurons(&["TypeScript", "React"]);
    let eng = engine(matrix.clone());
    let t0 = Utc::now();

    eng.on_neuron_fired_at(&ids[0], t0);
    eng.on_neuron_fired_at(&ids[1], t0 + Duration::seconds(1));

    let m = matrix.read();
    assert_eq!(m.synapse_count(), 1);
    let syn = m.synapse_between(&ids[0], &ids[1]).expect("link formed");
    let syn = syn.read();
    assert!(syn.joins(&ids[0], &ids[1]));
    assert!(syn.weight >= eng.config().min_weight_to_form);
    assert!(syn.bidirectional);
}

#[test]
fn repeated_co_firing_strictly_increases_weight() {
    let (matrix, ids) = matrix_with_neurons(&["TypeScript", "React"]);
    let eng = engine(matrix.clone());
    let mut t = Utc::now();

    eng.on_neuron_fired_at(&ids[0], t);
    t += Duration::milliseconds(100);
    eng.on_neuron_fired_at(&ids[1], t);
    let mut last = matrix
        .read()
        .synapse_between(&ids[0], &ids[1])
        .unwrap()
        .read()
        .weight;

    for _ in 0..4 {
        t += Duration::milliseconds(100);
        eng.on_neuron_fired_at(&ids[0], t);
        t += Duration::milliseconds(100);
        eng.on_neuron_fired_at(&ids[1], t);
        let weight = matrix
            .read()
            .synapse_between(&ids[0], &ids[1])
            .unwrap()
            .read()
            .weight;
        assert!(weight > last, "weight must grow each round");
        assert!(weight <= 1.0);
        last = weight;
    }
}

#[test]
fn fires_outside_the_window_do_not_link() {
    let (matrix, ids) = matrix_with_neurons(&["apart", "in time"]);
    let eng = engine(matrix.clone());
    let t0 = Utc::now();

    eng.on_neuron_fired_at(&ids[0], t0);
    eng.on_neuron_fired_at(&ids[1], t0 + Duration::seconds(60));

    assert_eq!(matrix.read().synapse_count(), 0);
}

#[test]
fn formation_respects_the_per_neuron_cap() {
    let (matrix, ids) = matrix_with_neurons(&["hub", "s1", "s2", "s3"]);
    let cfg = HebbianConfig {
        max_synapses_per_neuron: 2,
        ..HebbianConfig::default()
    };
    let eng = HebbianEngine::new(matrix.clone(), cfg);
    let mut t = Utc::now();

    for spoke in &ids[1..] {
        eng.on_neuron_fired_at(&ids[0], t);
        t += Duration::milliseconds(50);
        eng.on_neuron_fired_at(spoke, t);
        // Space rounds apart so only the hub pair co-activates.
        t += Duration::seconds(30);
    }

    assert_eq!(matrix.read().degree(&ids[0]), 2, "cap stops the third link");
}

#[test]
fn decay_all_is_time_proportional() {
    let (matrix, ids) = matrix_with_neurons(&["a", "b"]);
    {
        let mut m = matrix.write();
        let mut syn = Synapse::new(ids[0].clone(), ids[1].clone(), 0.8);
        syn.last_decay_at = Some(Utc::now() - Duration::hours(10));
        m.insert_synapse(syn).unwrap();
    }
    let cfg = HebbianConfig {
        forgetting_rate: 0.01,
        ..HebbianConfig::default()
    };
    let eng = HebbianEngine::new(matrix.clone(), cfg);
    eng.decay_all();

    let weight = matrix
        .read()
        .synapse_between(&ids[0], &ids[1])
        .unwrap()
        .read()
        .weight;
    assert!((weight - 0.7).abs() < 0.01, "10h at 0.01/h removes ~0.1");
}

#[test]
fn prune_removes_dead_synapses_and_scrubs_adjacency() {
    let (matrix, ids) = matrix_with_neurons(&["a", "b", "c"]);
    {
        let mut m = matrix.write();
        m.insert_synapse(Synapse::new(ids[0].clone(), ids[1].clone(), 0.01))
            .unwrap();
        m.insert_synapse(Synapse::new(ids[1].clone(), ids[2].clone(), 0.9))
            .unwrap();
    }
    let eng = engine(matrix.clone());
    let removed = eng.prune_dead_synapses();

    assert_eq!(removed, 1);
    let m = matrix.read();
    assert_eq!(m.synapse_count(), 1);
    assert!(!m.neighbors(&ids[0]).contains(&ids[1]));
    assert!(!m.neighbors(&ids[1]).contains(&ids[0]));
    assert!(m.neighbors(&ids[1]).contains(&ids[2]));
}

#[test]
fn fractal_update_pulls_a_pair_together() {
    let mut m = Matrix::new("spatial");
    let mut a = Neuron::new("a", vec![-0.8, -0.8, -0.8]);
    let mut b = Neuron::new("b", vec![0.8, 0.8, 0.8]);
    a.position = vec![-0.8; m.current_dim];
    b.position = vec![0.8; m.current_dim];
    let (a_id, b_id) = (a.id.clone(), b.id.clone());
    m.insert_neuron(a).unwrap();
    m.insert_neuron(b).unwrap();
    m.insert_synapse(Synapse::new(a_id.clone(), b_id.clone(), 0.9))
        .unwrap();
    let matrix = Arc::new(RwLock::new(m));
    let eng = engine(matrix.clone());

    let dist_before = distance(&matrix, &a_id, &b_id);
    eng.update_pair_now(&a_id, &b_id, 0.2);
    let dist_after = distance(&matrix, &a_id, &b_id);
    assert!(dist_after < dist_before);

    // Positions stay in the unit cube.
    let m = matrix.read();
    for id in [&a_id, &b_id] {
        let n = m.neuron(id).unwrap();
        assert!(n.read().position.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}

#[test]
fn bulk_reorg_only_moves_strongly_linked_pairs() {
    let mut m = Matrix::new("reorg");
    let dim = m.current_dim;
    let mk = |v: f64| {
        let mut n = Neuron::new(format!("n{v}"), vec![v; dim]);
        n.position = vec![v; dim];
        n
    };
    let strong_a = mk(-0.9);
    let strong_b = mk(0.9);
    let weak_a = mk(-0.5);
    let weak_b = mk(0.5);
    let ids: Vec<String> = [&strong_a, &strong_b, &weak_a, &weak_b]
        .iter()
        .map(|n| n.id.clone())
        .collect();
    for n in [strong_a, strong_b, weak_a, weak_b] {
        m.insert_neuron(n).unwrap();
    }
    m.insert_synapse(Synapse::new(ids[0].clone(), ids[1].clone(), 0.9))
        .unwrap();
    m.insert_synapse(Synapse::new(ids[2].clone(), ids[3].clone(), 0.1))
        .unwrap();
    let matrix = Arc::new(RwLock::new(m));
    let eng = engine(matrix.clone());

    let strong_before = distance(&matrix, &ids[0], &ids[1]);
    eng.update_fractal_clusters();
    let strong_after = distance(&matrix, &ids[0], &ids[1]);
    assert!(strong_after < strong_before, "strong pair attracted");
}

#[test]
fn firing_an_unknown_neuron_is_harmless() {
    let (matrix, ids) = matrix_with_neurons(&["only"]);
    let eng = engine(matrix.clone());
    let t0 = Utc::now();
    eng.on_neuron_fired_at("no-such-id", t0);
    eng.on_neuron_fired_at(&ids[0], t0 + Duration::seconds(1));
    // Co-activation against a ghost id forms nothing.
    assert_eq!(matrix.read().synapse_count(), 0);
}

#[test]
fn self_tune_changes_direction_with_connectivity() {
    let (matrix, _) = matrix_with_neurons(&["a", "b", "c", "d"]);
    let eng = engine(matrix.clone());
    let before = eng.config();
    eng.self_tune(); // 4 neurons, 0 synapses: sparse
    let after = eng.config();
    assert!(after.learning_rate > before.learning_rate);
    assert!(after.min_weight_to_form < before.min_weight_to_form);
}

fn distance(matrix: &Arc<RwLock<Matrix>>, a: &str, b: &str) -> f64 {
    let m = matrix.read();
    let pa = m.neuron(a).unwrap().read().position.clone();
    let pb = m.neuron(b).unwrap().read().position.clone();
    pa.iter()
        .zip(&pb)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
