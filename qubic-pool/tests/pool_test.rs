//! Pool behavior: lazy creation, eviction round-trips, truncate, isolation.

use std::sync::Arc;

use qubic_brain::{AddNeuron, OpOutput, Operation, SearchRequest};
use qubic_core::config::{FsyncPolicy, HebbianConfig, PoolConfig, StoreConfig};
use qubic_core::QubicError;
use qubic_pool::BrainPool;
use qubic_registry::Registry;
use qubic_store::NeuroStore;

fn store_at(dir: &tempfile::TempDir) -> Arc<NeuroStore> {
    let cfg = StoreConfig {
        base_path: dir.path().to_path_buf(),
        fsync_policy: FsyncPolicy::Off,
        ..StoreConfig::default()
    };
    Arc::new(NeuroStore::open(cfg).unwrap())
}

fn pool_over(store: Arc<NeuroStore>) -> Arc<BrainPool> {
    BrainPool::new(store, None, PoolConfig::default(), HebbianConfig::default())
}

async fn write(pool: &BrainPool, tenant: &str, content: &str) -> String {
    let worker = pool.get_or_create(tenant).await.unwrap();
    let out = worker
        .submit(Operation::Write(AddNeuron {
            content: content.to_string(),
            ..AddNeuron::default()
        }))
        .await
        .unwrap();
    match out {
        OpOutput::Neuron(v) => v.id,
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn get_or_create_is_lazy_and_cached() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = pool_over(store_at(&dir));
    assert_eq!(pool.active_count(), 0);

    let a = pool.get_or_create("tenant-a").await.unwrap();
    let again = pool.get_or_create("tenant-a").await.unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(pool.active_count(), 1);
    assert_eq!(pool.list_indexes(), vec!["tenant-a".to_string()]);
}

#[tokio::test]
async fn eviction_preserves_tenant_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(&dir);
    let pool = pool_over(store.clone());

    let id = write(&pool, "sticky", "a memory that must survive").await;
    pool.evict("sticky").await.unwrap();
    assert_eq!(pool.active_count(), 0);

    // Recreation loads the persisted matrix.
    let worker = pool.get_or_create("sticky").await.unwrap();
    let out = worker.submit(Operation::Read { id }).await.unwrap();
    match out {
        OpOutput::Neuron(v) => assert_eq!(v.content, "a memory that must survive"),
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn truncate_discards_all_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(&dir);
    let pool = pool_over(store.clone());

    write(&pool, "doomed", "soon forgotten").await;
    pool.truncate("doomed").await.unwrap();

    assert!(!store.exists("doomed"));
    // A new worker starts from an empty matrix.
    let worker = pool.get_or_create("doomed").await.unwrap();
    assert_eq!(worker.stats().neuron_count, 0);
}

#[tokio::test]
async fn operations_on_one_tenant_never_touch_another() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = pool_over(store_at(&dir));

    let a_id = write(&pool, "tenant-a", "alpha only").await;
    write(&pool, "tenant-b", "beta only").await;

    let worker_b = pool.get("tenant-b").unwrap();
    // Tenant B cannot see or delete tenant A's neuron.
    assert!(matches!(
        worker_b
            .submit(Operation::Read { id: a_id.clone() })
            .await
            .unwrap_err(),
        QubicError::NotFound { .. }
    ));
    assert!(matches!(
        worker_b
            .submit(Operation::Forget { id: a_id.clone() })
            .await
            .unwrap_err(),
        QubicError::NotFound { .. }
    ));

    let worker_a = pool.get("tenant-a").unwrap();
    let out = worker_a.submit(Operation::Read { id: a_id }).await.unwrap();
    assert!(matches!(out, OpOutput::Neuron(_)));
}

#[tokio::test]
async fn registry_gates_creation_when_wired() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry =
        Arc::new(Registry::open(dir.path().join("registry.json")).unwrap());
    let known = uuid::Uuid::new_v4().to_string();
    registry.create(&known, serde_json::json!({})).unwrap();

    let pool = BrainPool::new(
        store_at(&dir),
        Some(registry),
        PoolConfig::default(),
        HebbianConfig::default(),
    );

    assert!(pool.get_or_create(&known).await.is_ok());
    let unknown = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        pool.get_or_create(&unknown).await.unwrap_err(),
        QubicError::UuidNotRegistered { .. }
    ));
}

#[tokio::test]
async fn persist_all_flushes_every_live_matrix() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(&dir);
    let pool = pool_over(store.clone());

    write(&pool, "one", "first").await;
    write(&pool, "two", "second").await;
    pool.persist_all().unwrap();

    assert!(dir.path().join("data/one.nrdb").exists());
    assert!(dir.path().join("data/two.nrdb").exists());
}

#[tokio::test]
async fn shutdown_stops_and_persists_all_workers() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(&dir);
    let pool = pool_over(store.clone());

    write(&pool, "one", "first").await;
    write(&pool, "two", "second").await;
    pool.shutdown().await.unwrap();

    assert_eq!(pool.active_count(), 0);
    assert!(store.exists("one"));
    assert!(store.exists("two"));
}

#[tokio::test]
async fn stats_aggregate_across_tenants() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = pool_over(store_at(&dir));
    write(&pool, "s1", "neuron one").await;
    write(&pool, "s2", "neuron two").await;
    write(&pool, "s2", "neuron three").await;

    let stats = pool.stats();
    assert_eq!(stats.active_workers, 2);
    assert_eq!(stats.total_neurons, 3);
}

#[tokio::test]
async fn idle_workers_are_evicted_with_a_final_save() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(&dir);
    let cfg = PoolConfig {
        max_idle_ms: 50,
        eviction_tick_ms: 25,
        ..PoolConfig::default()
    };
    let pool = BrainPool::new(store.clone(), None, cfg, HebbianConfig::default());
    write(&pool, "drowsy", "remembered across eviction").await;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let loop_handle = pool.spawn_eviction_loop(cancel_rx);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(pool.active_count(), 0, "idle worker evicted");
    assert!(store.exists("drowsy"), "eviction persisted the matrix");

    let _ = cancel_tx.send(true);
    let _ = loop_handle.await;

    // Content survives recreation.
    let worker = pool.get_or_create("drowsy").await.unwrap();
    assert_eq!(worker.stats().neuron_count, 1);
}

#[tokio::test]
async fn search_runs_through_the_pool_worker() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = pool_over(store_at(&dir));
    write(&pool, "searchable", "rust ownership rules").await;
    write(&pool, "searchable", "gardening tips").await;

    let worker = pool.get("searchable").unwrap();
    let out = worker
        .submit(Operation::Search(SearchRequest::simple("rust ownership")))
        .await
        .unwrap();
    match out {
        OpOutput::Hits(hits) => {
            assert!(!hits.is_empty());
            assert_eq!(hits[0].neuron.content, "rust ownership rules");
        }
        other => panic!("unexpected output: {other:?}"),
    }
}
