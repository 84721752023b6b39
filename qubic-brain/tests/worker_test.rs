//! Worker loop semantics: operation handling, dedup, maintenance ops,
//! shutdown and cancellation.

use chrono::{Duration, Utc};

use qubic_brain::{AddNeuron, BrainWorker, ListNeurons, OpOutput, Operation, SearchRequest, UpdateNeuron};
use qubic_core::config::HebbianConfig;
use qubic_core::model::Matrix;
use qubic_core::QubicError;

fn spawn_worker(tenant: &str) -> std::sync::Arc<BrainWorker> {
    BrainWorker::spawn(Matrix::new(tenant), HebbianConfig::default(), 64)
}

async fn write(worker: &BrainWorker, content: &str) -> qubic_brain::NeuronView {
    match worker
        .submit(Operation::Write(AddNeuron {
            content: content.to_string(),
            ..AddNeuron::default()
        }))
        .await
        .unwrap()
    {
        OpOutput::Neuron(v) => v,
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn write_then_read() {
    let worker = spawn_worker("t");
    let view = write(&worker, "hello brain").await;
    assert_eq!(view.content, "hello brain");
    assert!(!view.position.is_empty());
    assert!(view.position.iter().all(|v| (-1.0..=1.0).contains(v)));

    match worker
        .submit(Operation::Read { id: view.id.clone() })
        .await
        .unwrap()
    {
        OpOutput::Neuron(read_back) => {
            assert_eq!(read_back.id, view.id);
            // Read fires the neuron.
            assert!(read_back.access_count > view.access_count);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn empty_and_oversized_content_are_rejected() {
    let worker = spawn_worker("t");
    let err = worker
        .submit(Operation::Write(AddNeuron {
            content: "   ".to_string(),
            ..AddNeuron::default()
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::InvalidInput { .. }));

    worker.set_content_limit(16);
    let err = worker
        .submit(Operation::Write(AddNeuron {
            content: "x".repeat(64),
            ..AddNeuron::default()
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::ContentTooLarge { limit: 16, .. }));
}

#[tokio::test]
async fn duplicate_content_returns_the_existing_neuron() {
    let worker = spawn_worker("t");
    let first = write(&worker, "the exact same thought").await;
    let second = write(&worker, "the exact same thought").await;
    assert_eq!(first.id, second.id);
    // The duplicate write fired the neuron instead of erroring.
    assert!(second.access_count > first.access_count);
    assert_eq!(worker.stats().neuron_count, 1);
}

#[tokio::test]
async fn child_is_placed_near_its_parent() {
    let worker = spawn_worker("t");
    let parent = write(&worker, "parent thought").await;
    let child = match worker
        .submit(Operation::Write(AddNeuron {
            content: "child thought".to_string(),
            parent_id: Some(parent.id.clone()),
            ..AddNeuron::default()
        }))
        .await
        .unwrap()
    {
        OpOutput::Neuron(v) => v,
        other => panic!("unexpected output: {other:?}"),
    };
    let dist: f64 = parent
        .position
        .iter()
        .zip(&child.position)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt();
    assert!(dist < 0.5, "child jitter stays near the parent");

    let err = worker
        .submit(Operation::Write(AddNeuron {
            content: "orphan".to_string(),
            parent_id: Some("no-such-parent".to_string()),
            ..AddNeuron::default()
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::NotFound { .. }));
}

#[tokio::test]
async fn touch_updates_content_and_hash() {
    let worker = spawn_worker("t");
    let view = write(&worker, "draft").await;
    match worker
        .submit(Operation::Touch(UpdateNeuron {
            id: view.id.clone(),
            content: "final".to_string(),
        }))
        .await
        .unwrap()
    {
        OpOutput::Neuron(updated) => {
            assert_eq!(updated.content, "final");
            assert_ne!(updated.content_hash, view.content_hash);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn forget_removes_the_neuron() {
    let worker = spawn_worker("t");
    let view = write(&worker, "fleeting").await;
    worker
        .submit(Operation::Forget { id: view.id.clone() })
        .await
        .unwrap();
    let err = worker
        .submit(Operation::Read { id: view.id })
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::NotFound { .. }));
}

#[tokio::test]
async fn recall_paginates_and_filters_by_depth() {
    let worker = spawn_worker("t");
    for i in 0..5 {
        write(&worker, &format!("memory {i}")).await;
    }
    // Promote one neuron to depth 2 directly through the matrix handle.
    let matrix = worker.matrix();
    let deep_id = {
        let m = matrix.read();
        let (id, handle) = m.neuron_handles().into_iter().next().unwrap();
        handle.write().depth = 2;
        id
    };

    match worker
        .submit(Operation::Recall(ListNeurons {
            offset: 0,
            limit: 3,
            min_depth: None,
        }))
        .await
        .unwrap()
    {
        OpOutput::Neurons(views) => assert_eq!(views.len(), 3),
        other => panic!("unexpected output: {other:?}"),
    }

    match worker
        .submit(Operation::Recall(ListNeurons {
            offset: 0,
            limit: 10,
            min_depth: Some(1),
        }))
        .await
        .unwrap()
    {
        OpOutput::Neurons(views) => {
            assert_eq!(views.len(), 1);
            assert_eq!(views[0].id, deep_id);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn search_spreads_over_strong_links() {
    let worker = spawn_worker("t");
    let hit = write(&worker, "rust async runtimes").await;
    let linked = write(&worker, "green threads and executors").await;
    write(&worker, "completely unrelated gardening").await;

    // Wire a strong synapse by hand; link_threshold defaults to 0.3.
    {
        let matrix = worker.matrix();
        let mut m = matrix.write();
        m.insert_synapse(qubic_core::model::Synapse::new(
            hit.id.clone(),
            linked.id.clone(),
            0.9,
        ))
        .unwrap();
    }

    let shallow = match worker
        .submit(Operation::Search(SearchRequest {
            depth: 0,
            ..SearchRequest::simple("rust async")
        }))
        .await
        .unwrap()
    {
        OpOutput::Hits(hits) => hits,
        other => panic!("unexpected output: {other:?}"),
    };
    assert!(shallow.iter().all(|h| h.neuron.id != linked.id));

    let deep = match worker
        .submit(Operation::Search(SearchRequest {
            depth: 1,
            ..SearchRequest::simple("rust async")
        }))
        .await
        .unwrap()
    {
        OpOutput::Hits(hits) => hits,
        other => panic!("unexpected output: {other:?}"),
    };
    let spread = deep.iter().find(|h| h.neuron.id == linked.id);
    assert!(spread.is_some(), "depth 1 reaches the linked neuron");
    assert_eq!(spread.unwrap().hops, 1);
}

#[tokio::test]
async fn strict_tag_filter_excludes_non_matches() {
    let worker = spawn_worker("t");
    worker
        .submit(Operation::Write(AddNeuron {
            content: "rust memory tricks".to_string(),
            tags: vec!["work".to_string()],
            ..AddNeuron::default()
        }))
        .await
        .unwrap();
    write(&worker, "rust memory safety").await;

    let hits = match worker
        .submit(Operation::Search(SearchRequest {
            tags: vec!["work".to_string()],
            strict: true,
            ..SearchRequest::simple("rust memory")
        }))
        .await
        .unwrap()
    {
        OpOutput::Hits(hits) => hits,
        other => panic!("unexpected output: {other:?}"),
    };
    assert_eq!(hits.len(), 1);
    assert!(hits[0].neuron.tags.contains(&"work".to_string()));
}

#[tokio::test]
async fn consolidate_promotes_cooled_frequently_accessed_neurons() {
    let worker = spawn_worker("t");
    let view = write(&worker, "important old memory").await;
    {
        let matrix = worker.matrix();
        let m = matrix.read();
        let handle = m.neuron(&view.id).unwrap();
        let mut n = handle.write();
        n.access_count = 10;
        n.created_at = Utc::now() - Duration::days(2);
        n.energy = 0.3;
    }

    match worker.submit(Operation::Consolidate).await.unwrap() {
        OpOutput::Count(promoted) => assert_eq!(promoted, 1),
        other => panic!("unexpected output: {other:?}"),
    }
    let matrix = worker.matrix();
    let m = matrix.read();
    assert_eq!(m.neuron(&view.id).unwrap().read().depth, 1);
    assert!(m.version > 0);
}

#[tokio::test]
async fn prune_removes_dormant_neurons() {
    let worker = spawn_worker("t");
    let doomed = write(&worker, "fading away").await;
    let kept = write(&worker, "still bright").await;
    {
        let matrix = worker.matrix();
        let m = matrix.read();
        let handle = m.neuron(&doomed.id).unwrap();
        let mut n = handle.write();
        n.energy = 0.005;
        n.base_energy = 0.0;
    }

    match worker.submit(Operation::Prune).await.unwrap() {
        OpOutput::Count(removed) => assert_eq!(removed, 1),
        other => panic!("unexpected output: {other:?}"),
    }
    assert_eq!(worker.stats().neuron_count, 1);
    let err = worker
        .submit(Operation::Read { id: doomed.id })
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::NotFound { .. }));
    assert!(worker
        .submit(Operation::Read { id: kept.id })
        .await
        .is_ok());
}

#[tokio::test]
async fn decay_runs_and_reports_pruned_synapses() {
    let worker = spawn_worker("t");
    write(&worker, "anything").await;
    match worker.submit(Operation::Decay).await.unwrap() {
        OpOutput::Count(_) => {}
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn stats_reflect_the_matrix() {
    let worker = spawn_worker("stats-tenant");
    write(&worker, "one").await;
    write(&worker, "two").await;

    match worker.submit(Operation::GetStats).await.unwrap() {
        OpOutput::Stats(stats) => {
            assert_eq!(stats.index_id, "stats-tenant");
            assert_eq!(stats.neuron_count, 2);
            assert!(stats.total_energy > 0.0);
            assert!(stats.total_activations >= 2);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn operations_are_handled_in_submission_order() {
    let worker = spawn_worker("t");
    let view = write(&worker, "v0").await;
    for i in 1..=20 {
        worker
            .submit(Operation::Touch(UpdateNeuron {
                id: view.id.clone(),
                content: format!("v{i}"),
            }))
            .await
            .unwrap();
    }
    match worker
        .submit(Operation::Read { id: view.id })
        .await
        .unwrap()
    {
        OpOutput::Neuron(v) => assert_eq!(v.content, "v20"),
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn submit_after_stop_is_canceled() {
    let worker = spawn_worker("t");
    write(&worker, "before stop").await;
    worker.stop().await;

    let err = worker
        .submit(Operation::Read {
            id: "whatever".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QubicError::Canceled));
    assert!(!worker.submit_async(Operation::Decay));
}

#[tokio::test]
async fn shutdown_operation_stops_the_loop() {
    let worker = spawn_worker("t");
    write(&worker, "pre-shutdown").await;
    worker.submit(Operation::Shutdown).await.unwrap();

    // Give the loop a beat to exit, then further submits are canceled.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let err = worker.submit(Operation::GetStats).await.unwrap_err();
    assert!(matches!(err, QubicError::Canceled));
}
