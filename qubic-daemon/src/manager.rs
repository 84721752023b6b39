use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use qubic_brain::{OpOutput, Operation};
use qubic_core::config::DaemonConfig;
use qubic_core::model::LifecycleState;
use qubic_lifecycle::LifecycleManager;
use qubic_pool::BrainPool;
use qubic_store::NeuroStore;

struct Intervals {
    decay_ms: AtomicU64,
    consolidate_ms: AtomicU64,
    prune_ms: AtomicU64,
    persist_ms: AtomicU64,
    reorg_ms: AtomicU64,
}

/// Owns the five maintenance loops.
pub struct DaemonManager {
    pool: Arc<BrainPool>,
    store: Arc<NeuroStore>,
    lifecycle: Arc<LifecycleManager>,
    intervals: Intervals,
    cancel: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DaemonManager {
    pub fn new(
        pool: Arc<BrainPool>,
        store: Arc<NeuroStore>,
        lifecycle: Arc<LifecycleManager>,
        cfg: DaemonConfig,
    ) -> Arc<Self> {
        let (cancel, _) = watch::channel(false);
        Arc::new(Self {
            pool,
            store,
            lifecycle,
            intervals: Intervals {
                decay_ms: AtomicU64::new(cfg.decay_interval_ms),
                consolidate_ms: AtomicU64::new(cfg.consolidate_interval_ms),
                prune_ms: AtomicU64::new(cfg.prune_interval_ms),
                persist_ms: AtomicU64::new(cfg.persist_interval_ms),
                reorg_ms: AtomicU64::new(cfg.reorg_interval_ms),
            },
            cancel,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn all five loops. Idempotence is the caller's concern.
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock();
        handles.push(self.spawn_loop(Loop::Decay));
        handles.push(self.spawn_loop(Loop::Consolidate));
        handles.push(self.spawn_loop(Loop::Prune));
        handles.push(self.spawn_loop(Loop::Persist));
        handles.push(self.spawn_loop(Loop::Reorg));
        tracing::info!("daemon manager started");
    }

    /// Cancel all loops and wait for each to exit. The persist loop runs
    /// one final full persist before returning.
    pub async fn stop(&self) {
        let _ = self.cancel.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("daemon manager stopped");
    }

    // Runtime interval tuning.

    pub fn set_decay_interval_ms(&self, ms: u64) {
        self.intervals.decay_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn set_consolidate_interval_ms(&self, ms: u64) {
        self.intervals.consolidate_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn set_prune_interval_ms(&self, ms: u64) {
        self.intervals.prune_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn set_persist_interval_ms(&self, ms: u64) {
        self.intervals.persist_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn set_reorg_interval_ms(&self, ms: u64) {
        self.intervals.reorg_ms.store(ms.max(1), Ordering::Relaxed);
    }

    fn spawn_loop(self: &Arc<Self>, which: Loop) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut cancel = self.cancel.subscribe();
        tokio::spawn(async move {
            loop {
                let interval = Duration::from_millis(manager.interval_of(which).max(1));
                tokio::select! {
                    _ = tokio::time::sleep(interval) => manager.tick(which).await,
                    _ = cancel.changed() => break,
                }
            }
            if which == Loop::Persist {
                // Final full persist on the way out.
                if let Err(e) = manager.pool.persist_all() {
                    tracing::warn!("final persist failed: {e}");
                }
            }
            tracing::debug!("{which:?} loop exited");
        })
    }

    fn interval_of(&self, which: Loop) -> u64 {
        match which {
            Loop::Decay => self.intervals.decay_ms.load(Ordering::Relaxed),
            Loop::Consolidate => self.intervals.consolidate_ms.load(Ordering::Relaxed),
            Loop::Prune => self.intervals.prune_ms.load(Ordering::Relaxed),
            Loop::Persist => self.intervals.persist_ms.load(Ordering::Relaxed),
            Loop::Reorg => self.intervals.reorg_ms.load(Ordering::Relaxed),
        }
    }

    async fn tick(&self, which: Loop) {
        match which {
            Loop::Decay => self.decay_tick(),
            Loop::Consolidate => self.consolidate_tick().await,
            Loop::Prune => self.prune_tick().await,
            Loop::Persist => self.persist_tick(),
            Loop::Reorg => self.reorg_tick(),
        }
    }

    /// Decay fires-and-forgets into Active and Idle tenants; a lagging
    /// worker drops the request instead of stalling the scheduler.
    fn decay_tick(&self) {
        let mut targets = self.lifecycle.tenants_in(LifecycleState::Active);
        targets.extend(self.lifecycle.tenants_in(LifecycleState::Idle));
        for id in targets {
            if let Some(worker) = self.pool.get(&id) {
                worker.submit_async(Operation::Decay);
            }
        }
    }

    /// Consolidation is the sleep phase: only Sleeping tenants, submitted
    /// synchronously so the promotion count can be logged.
    async fn consolidate_tick(&self) {
        for id in self.lifecycle.tenants_in(LifecycleState::Sleeping) {
            let Some(worker) = self.pool.get(&id) else { continue };
            match worker.submit(Operation::Consolidate).await {
                Ok(OpOutput::Count(promoted)) => {
                    tracing::info!("{id}: consolidated {promoted} neurons");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("consolidate of {id} failed: {e}"),
            }
        }
    }

    async fn prune_tick(&self) {
        for (id, worker) in self.pool.snapshot() {
            match worker.submit(Operation::Prune).await {
                Ok(OpOutput::Count(pruned)) if pruned > 0 => {
                    tracing::info!("{id}: pruned {pruned} dormant neurons");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("prune of {id} failed: {e}"),
            }
        }
    }

    fn persist_tick(&self) {
        for (id, worker) in self.pool.snapshot() {
            let matrix = worker.matrix();
            let result = {
                let m = matrix.read();
                self.store.save_async(&m)
            };
            if let Err(e) = result {
                tracing::warn!("persist of {id} failed: {e}");
            }
        }
        if let Err(e) = self.store.flush_all() {
            tracing::warn!("flush failed: {e}");
        }
    }

    fn reorg_tick(&self) {
        for id in self.lifecycle.tenants_in(LifecycleState::Sleeping) {
            if let Some(worker) = self.pool.get(&id) {
                worker.submit_async(Operation::Reorg);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loop {
    Decay,
    Consolidate,
    Prune,
    Persist,
    Reorg,
}
