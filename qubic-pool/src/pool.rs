use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use qubic_brain::{BrainWorker, WorkerStats};
use qubic_core::config::{HebbianConfig, PoolConfig};
use qubic_core::model::Matrix;
use qubic_core::traits::{IEmbeddingProvider, ISentimentAnalyzer};
use qubic_core::{QubicError, QubicResult};
use qubic_registry::Registry;
use qubic_store::NeuroStore;

/// Aggregate pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub active_workers: usize,
    pub total_neurons: usize,
    pub total_synapses: usize,
    pub per_tenant: Vec<WorkerStats>,
}

/// IndexID -> worker map with lazy creation and idle eviction.
pub struct BrainPool {
    cfg: PoolConfig,
    hebbian: HebbianConfig,
    store: Arc<NeuroStore>,
    /// Trust boundary: when wired, unknown uuids are refused.
    registry: Option<Arc<Registry>>,
    workers: DashMap<String, Arc<BrainWorker>>,
    /// Serializes slow-path creation; never held while touching `workers`
    /// on the fast path.
    create_lock: tokio::sync::Mutex<()>,
    vectorizer: RwLock<Option<Arc<dyn IEmbeddingProvider>>>,
    sentiment: RwLock<Option<Arc<dyn ISentimentAnalyzer>>>,
    alpha_bits: AtomicU64,
    max_idle_ms: AtomicU64,
    max_neurons: AtomicUsize,
}

impl BrainPool {
    pub fn new(
        store: Arc<NeuroStore>,
        registry: Option<Arc<Registry>>,
        cfg: PoolConfig,
        hebbian: HebbianConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            alpha_bits: AtomicU64::new(cfg.search_alpha.to_bits()),
            max_idle_ms: AtomicU64::new(cfg.max_idle_ms),
            max_neurons: AtomicUsize::new(cfg.max_neurons),
            cfg,
            hebbian,
            store,
            registry,
            workers: DashMap::new(),
            create_lock: tokio::sync::Mutex::new(()),
            vectorizer: RwLock::new(None),
            sentiment: RwLock::new(None),
        })
    }

    /// Get the tenant's worker, creating (and loading) it on first access.
    pub async fn get_or_create(&self, index_id: &str) -> QubicResult<Arc<BrainWorker>> {
        // Fast path.
        if let Some(worker) = self.workers.get(index_id) {
            return Ok(worker.clone());
        }
        if let Some(registry) = &self.registry {
            if !registry.exists(index_id) {
                return Err(QubicError::UuidNotRegistered {
                    uuid: index_id.to_string(),
                });
            }
        }

        // Slow path: a dedicated create lock, then double-check.
        let _guard = self.create_lock.lock().await;
        if let Some(worker) = self.workers.get(index_id) {
            return Ok(worker.clone());
        }

        let mut matrix = if self.store.exists(index_id) {
            match self.store.load(index_id) {
                Ok(data) => Matrix::from_data(data),
                Err(e) => {
                    tracing::warn!("load of {index_id} failed, starting empty: {e}");
                    Matrix::new(index_id)
                }
            }
        } else {
            Matrix::new(index_id)
        };
        matrix.bounds.max_neurons = self.max_neurons.load(Ordering::Relaxed);

        let worker = BrainWorker::spawn(matrix, self.hebbian.clone(), self.cfg.queue_capacity);
        worker.set_content_limit(self.cfg.content_limit);
        worker.set_alpha(f64::from_bits(self.alpha_bits.load(Ordering::Relaxed)));
        worker.set_vectorizer(self.vectorizer.read().clone());
        worker.set_sentiment(self.sentiment.read().clone());

        self.workers.insert(index_id.to_string(), worker.clone());
        tracing::info!("worker created for {index_id}");
        Ok(worker)
    }

    /// Get an already-live worker.
    pub fn get(&self, index_id: &str) -> Option<Arc<BrainWorker>> {
        self.workers.get(index_id).map(|w| w.clone())
    }

    /// Ids of all live workers.
    pub fn list_indexes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Stop a worker, persist its matrix one last time, drop it.
    pub async fn evict(&self, index_id: &str) -> QubicResult<()> {
        let Some((_, worker)) = self.workers.remove(index_id) else {
            return Err(QubicError::not_found(format!("worker {index_id}")));
        };
        worker.stop().await;
        let matrix = worker.matrix();
        let result = {
            let m = matrix.read();
            self.store.save(&m)
        };
        match result {
            Ok(()) => {
                tracing::info!("worker for {index_id} evicted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("final persist for {index_id} failed: {e}");
                Err(e)
            }
        }
    }

    /// Stop the worker and delete all persistent state. No final save.
    pub async fn truncate(&self, index_id: &str) -> QubicResult<()> {
        if let Some((_, worker)) = self.workers.remove(index_id) {
            worker.stop().await;
        }
        self.store.delete(index_id)?;
        tracing::info!("tenant {index_id} truncated");
        Ok(())
    }

    /// Snapshot the worker set, then run the closure on each pair with no
    /// pool lock held.
    pub fn for_each<F: FnMut(&str, &Arc<BrainWorker>)>(&self, mut f: F) {
        for (id, worker) in self.snapshot() {
            f(&id, &worker);
        }
    }

    /// Snapshot of the current (id, worker) set.
    pub fn snapshot(&self) -> Vec<(String, Arc<BrainWorker>)> {
        self.workers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Save every live matrix. Returns the last error, if any.
    pub fn persist_all(&self) -> QubicResult<()> {
        let mut last_err = None;
        for (id, worker) in self.snapshot() {
            let matrix = worker.matrix();
            let result = {
                let m = matrix.read();
                self.store.save_async(&m)
            };
            if let Err(e) = result {
                tracing::warn!("persist of {id} failed: {e}");
                last_err = Some(e);
            }
        }
        self.store.flush_all()?;
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop and persist every worker, clearing the map first so no new
    /// operations land while workers wind down.
    pub async fn shutdown(&self) -> QubicResult<()> {
        let snapshot = self.snapshot();
        self.workers.clear();
        let mut last_err = None;
        for (id, worker) in snapshot {
            worker.stop().await;
            let matrix = worker.matrix();
            let result = {
                let m = matrix.read();
                self.store.save(&m)
            };
            if let Err(e) = result {
                tracing::warn!("shutdown persist of {id} failed: {e}");
                last_err = Some(e);
            }
        }
        tracing::info!("pool shut down");
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn active_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PoolStats {
        let per_tenant: Vec<WorkerStats> =
            self.snapshot().into_iter().map(|(_, w)| w.stats()).collect();
        PoolStats {
            active_workers: per_tenant.len(),
            total_neurons: per_tenant.iter().map(|s| s.neuron_count).sum(),
            total_synapses: per_tenant.iter().map(|s| s.synapse_count).sum(),
            per_tenant,
        }
    }

    // ------------------------------------------------------------------
    // Broadcast setters: snapshot the set, push with no pool lock held.
    // ------------------------------------------------------------------

    pub fn set_vectorizer(&self, vectorizer: Option<Arc<dyn IEmbeddingProvider>>) {
        *self.vectorizer.write() = vectorizer.clone();
        for (_, worker) in self.snapshot() {
            worker.set_vectorizer(vectorizer.clone());
        }
    }

    pub fn set_sentiment(&self, sentiment: Option<Arc<dyn ISentimentAnalyzer>>) {
        *self.sentiment.write() = sentiment.clone();
        for (_, worker) in self.snapshot() {
            worker.set_sentiment(sentiment.clone());
        }
    }

    pub fn set_alpha(&self, alpha: f64) {
        self.alpha_bits
            .store(alpha.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        for (_, worker) in self.snapshot() {
            worker.set_alpha(alpha);
        }
    }

    pub fn set_max_idle_ms(&self, max_idle_ms: u64) {
        self.max_idle_ms.store(max_idle_ms, Ordering::Relaxed);
    }

    pub fn set_max_neurons(&self, max_neurons: usize) {
        self.max_neurons.store(max_neurons, Ordering::Relaxed);
        for (_, worker) in self.snapshot() {
            worker.set_max_neurons(max_neurons);
        }
    }

    /// Start the idle-eviction loop. Eviction reuses the `evict` path, so
    /// idle workers get a final save before dropping.
    pub fn spawn_eviction_loop(
        self: &Arc<Self>,
        mut cancel: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let tick = std::time::Duration::from_millis(pool.cfg.eviction_tick_ms.max(1));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => pool.evict_idle().await,
                    _ = cancel.changed() => break,
                }
            }
        })
    }

    async fn evict_idle(&self) {
        let max_idle = self.max_idle_ms.load(Ordering::Relaxed) as i64;
        let now = Utc::now().timestamp_millis();
        for (id, worker) in self.snapshot() {
            if now - worker.last_op_unix_ms() > max_idle {
                if let Err(e) = self.evict(&id).await {
                    // The worker may have been evicted concurrently.
                    tracing::debug!("idle eviction of {id} skipped: {e}");
                }
            }
        }
    }
}
