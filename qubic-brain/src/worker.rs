//! The per-tenant worker: one task, one matrix, one bounded queue.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use qubic_core::config::HebbianConfig;
use qubic_core::constants;
use qubic_core::model::{Matrix, Neuron};
use qubic_core::traits::{IEmbeddingProvider, ISentimentAnalyzer};
use qubic_core::{QubicError, QubicResult};
use qubic_hebbian::HebbianEngine;

use crate::ops::{
    AddNeuron, ListNeurons, NeuronView, OpOutput, Operation, SearchRequest, UpdateNeuron,
    WorkerStats,
};
use crate::search;

struct Envelope {
    op: Operation,
    reply: Option<oneshot::Sender<QubicResult<OpOutput>>>,
}

/// State shared between the worker handle and its loop task.
struct Shared {
    index_id: String,
    matrix: Arc<RwLock<Matrix>>,
    engine: Arc<HebbianEngine>,
    last_op_ms: AtomicI64,
    content_limit: AtomicUsize,
    /// f64 bits of the lexical/embedding blend factor.
    alpha_bits: AtomicU64,
    vectorizer: RwLock<Option<Arc<dyn IEmbeddingProvider>>>,
    sentiment: RwLock<Option<Arc<dyn ISentimentAnalyzer>>>,
}

/// Single-writer worker owning one tenant's matrix.
pub struct BrainWorker {
    shared: Arc<Shared>,
    tx: mpsc::Sender<Envelope>,
    cancel: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BrainWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrainWorker")
            .field("index_id", &self.shared.index_id)
            .finish_non_exhaustive()
    }
}

impl BrainWorker {
    /// Spawn a worker around an owned matrix. Must run inside a tokio
    /// runtime.
    pub fn spawn(matrix: Matrix, hebbian: HebbianConfig, queue_capacity: usize) -> Arc<Self> {
        let index_id = matrix.index_id.clone();
        let matrix = Arc::new(RwLock::new(matrix));
        let engine = Arc::new(HebbianEngine::new(Arc::clone(&matrix), hebbian));
        let shared = Arc::new(Shared {
            index_id: index_id.clone(),
            matrix,
            engine,
            last_op_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            content_limit: AtomicUsize::new(constants::DEFAULT_CONTENT_LIMIT),
            alpha_bits: AtomicU64::new(constants::DEFAULT_SEARCH_ALPHA.to_bits()),
            vectorizer: RwLock::new(None),
            sentiment: RwLock::new(None),
        });

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (cancel, cancel_rx) = watch::channel(false);
        let loop_shared = Arc::clone(&shared);
        let handle = tokio::spawn(run_loop(loop_shared, rx, cancel_rx));
        tracing::debug!("worker spawned for {index_id}");

        Arc::new(Self {
            shared,
            tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn index_id(&self) -> &str {
        &self.shared.index_id
    }

    /// The owned matrix. Direct readers must cooperate via its read lock;
    /// all mutation goes through the queue.
    pub fn matrix(&self) -> Arc<RwLock<Matrix>> {
        Arc::clone(&self.shared.matrix)
    }

    /// Submit an operation and wait for its result. Fails with `Canceled`
    /// when the worker stops while the operation is queued or in flight.
    pub async fn submit(&self, op: Operation) -> QubicResult<OpOutput> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                op,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| QubicError::Canceled)?;
        reply_rx.await.map_err(|_| QubicError::Canceled)?
    }

    /// Best-effort enqueue. Returns false when the queue is full or the
    /// worker is gone; the operation is simply dropped.
    pub fn submit_async(&self, op: Operation) -> bool {
        match self.tx.try_send(Envelope { op, reply: None }) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("async submit dropped for {}: {e}", self.shared.index_id);
                false
            }
        }
    }

    /// Cancel the loop and wait for it to drain.
    pub async fn stop(&self) {
        let _ = self.cancel.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Unix millis of the last handled operation (idle-eviction input).
    pub fn last_op_unix_ms(&self) -> i64 {
        self.shared.last_op_ms.load(Ordering::Relaxed)
    }

    /// Stats without going through the queue; used by the pool and daemons.
    pub fn stats(&self) -> WorkerStats {
        stats_of(&self.shared)
    }

    // ------------------------------------------------------------------
    // Broadcast setters (pool pushes these to every live worker)
    // ------------------------------------------------------------------

    pub fn set_vectorizer(&self, vectorizer: Option<Arc<dyn IEmbeddingProvider>>) {
        *self.shared.vectorizer.write() = vectorizer;
    }

    pub fn set_sentiment(&self, sentiment: Option<Arc<dyn ISentimentAnalyzer>>) {
        *self.shared.sentiment.write() = sentiment;
    }

    pub fn set_alpha(&self, alpha: f64) {
        self.shared
            .alpha_bits
            .store(alpha.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_content_limit(&self, limit: usize) {
        self.shared.content_limit.store(limit, Ordering::Relaxed);
    }

    pub fn set_max_neurons(&self, max_neurons: usize) {
        self.shared.matrix.write().bounds.max_neurons = max_neurons;
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Envelope>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            envelope = rx.recv() => match envelope {
                Some(envelope) => {
                    let shutdown = matches!(envelope.op, Operation::Shutdown);
                    let result = handle_op(&shared, envelope.op);
                    if let Some(reply) = envelope.reply {
                        let _ = reply.send(result);
                    }
                    if shutdown {
                        break;
                    }
                }
                None => break,
            },
            _ = cancel.changed() => break,
        }
    }

    // Drain: queued non-shutdown operations still complete.
    rx.close();
    while let Ok(envelope) = rx.try_recv() {
        let result = match envelope.op {
            Operation::Shutdown => Ok(OpOutput::Done),
            op => handle_op(&shared, op),
        };
        if let Some(reply) = envelope.reply {
            let _ = reply.send(result);
        }
    }
    tracing::debug!("worker loop for {} exited", shared.index_id);
}

fn handle_op(shared: &Shared, op: Operation) -> QubicResult<OpOutput> {
    shared
        .last_op_ms
        .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    match op {
        Operation::Write(req) => handle_write(shared, req),
        Operation::Read { id } => handle_read(shared, &id),
        Operation::Search(req) => handle_search(shared, &req),
        Operation::Touch(req) => handle_touch(shared, req),
        Operation::Forget { id } => handle_forget(shared, &id),
        Operation::Recall(req) => handle_recall(shared, &req),
        Operation::Fire { id } => {
            fire_neuron(shared, &id)?;
            Ok(OpOutput::Done)
        }
        Operation::Decay => handle_decay(shared),
        Operation::Consolidate => handle_consolidate(shared),
        Operation::Prune => handle_prune(shared),
        Operation::Reorg => {
            shared.engine.update_fractal_clusters();
            Ok(OpOutput::Done)
        }
        Operation::GetStats => Ok(OpOutput::Stats(stats_of(shared))),
        Operation::Shutdown => Ok(OpOutput::Done),
    }
}

fn handle_write(shared: &Shared, req: AddNeuron) -> QubicResult<OpOutput> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(QubicError::invalid("content is empty after trim"));
    }
    let limit = shared.content_limit.load(Ordering::Relaxed);
    if content.len() > limit {
        return Err(QubicError::ContentTooLarge {
            size: content.len(),
            limit,
        });
    }

    // Identical content is deduplicated: the existing neuron fires and is
    // returned instead of erroring.
    let hash = Neuron::compute_content_hash(content);
    let existing = shared.matrix.read().neuron_by_hash(&hash);
    if let Some(existing) = existing {
        let id = existing.read().id.clone();
        fire_neuron(shared, &id)?;
        let view = NeuronView::from(&*existing.read());
        return Ok(OpOutput::Neuron(view));
    }

    let position = {
        let m = shared.matrix.read();
        match req.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = m
                    .neuron(parent_id)
                    .ok_or_else(|| QubicError::not_found(format!("parent neuron {parent_id}")))?;
                let parent_position = parent.read().position.clone();
                m.position_near(&parent_position)
            }
            None => m.random_position(),
        }
    };

    let mut neuron = Neuron::new(content, position);
    neuron.tags = req.tags;
    if let Some(base) = req.base_energy {
        neuron.base_energy = base.clamp(0.0, 1.0);
        neuron.energy = neuron.energy.max(neuron.base_energy);
    }

    let vectorizer = shared.vectorizer.read().clone();
    if let Some(v) = vectorizer {
        if v.is_available() {
            match v.embed(content) {
                Ok(embedding) => neuron.embedding = Some(embedding),
                Err(e) => tracing::warn!("embedding failed: {e}"),
            }
        }
    }
    let sentiment = shared.sentiment.read().clone();
    if let Some(s) = sentiment {
        match s.analyze(content) {
            Ok(verdict) => {
                neuron.sentiment_label = Some(verdict.label);
                neuron.sentiment_score = Some(verdict.score);
            }
            Err(e) => tracing::warn!("sentiment analysis failed: {e}"),
        }
    }

    let id = neuron.id.clone();
    let handle = {
        let mut m = shared.matrix.write();
        let handle = m.insert_neuron(neuron)?;
        m.total_activations += 1;
        m.last_activity = Utc::now();
        handle
    };
    shared.engine.on_neuron_fired(&id);
    let view = NeuronView::from(&*handle.read());
    Ok(OpOutput::Neuron(view))
}

fn handle_read(shared: &Shared, id: &str) -> QubicResult<OpOutput> {
    let handle = shared
        .matrix
        .read()
        .neuron(id)
        .ok_or_else(|| QubicError::not_found(format!("neuron {id}")))?;
    fire_neuron(shared, id)?;
    let view = NeuronView::from(&*handle.read());
    Ok(OpOutput::Neuron(view))
}

fn handle_search(shared: &Shared, req: &SearchRequest) -> QubicResult<OpOutput> {
    if req.query.trim().is_empty() {
        return Err(QubicError::invalid("search query is empty"));
    }
    let alpha = f64::from_bits(shared.alpha_bits.load(Ordering::Relaxed));
    let query_embedding = shared.vectorizer.read().clone().and_then(|v| {
        if v.is_available() {
            v.embed(&req.query).ok()
        } else {
            None
        }
    });

    let hits = search::search(&shared.matrix, req, alpha, query_embedding.as_deref());

    // Associative recall: every returned neuron fires.
    for hit in &hits {
        let _ = fire_neuron(shared, &hit.neuron.id);
    }
    Ok(OpOutput::Hits(hits))
}

fn handle_touch(shared: &Shared, req: UpdateNeuron) -> QubicResult<OpOutput> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(QubicError::invalid("content is empty after trim"));
    }
    let limit = shared.content_limit.load(Ordering::Relaxed);
    if content.len() > limit {
        return Err(QubicError::ContentTooLarge {
            size: content.len(),
            limit,
        });
    }

    let mut m = shared.matrix.write();
    let handle = m
        .neuron(&req.id)
        .ok_or_else(|| QubicError::not_found(format!("neuron {}", req.id)))?;
    {
        let mut n = handle.write();
        n.set_content(content);
    }
    m.touch();
    let view = NeuronView::from(&*handle.read());
    Ok(OpOutput::Neuron(view))
}

fn handle_forget(shared: &Shared, id: &str) -> QubicResult<OpOutput> {
    let removed = shared.matrix.write().remove_neuron(id);
    if !removed {
        return Err(QubicError::not_found(format!("neuron {id}")));
    }
    Ok(OpOutput::Done)
}

fn handle_recall(shared: &Shared, req: &ListNeurons) -> QubicResult<OpOutput> {
    let mut views: Vec<NeuronView> = {
        let m = shared.matrix.read();
        m.neuron_handles()
            .into_iter()
            .map(|(_, h)| NeuronView::from(&*h.read()))
            .filter(|v| req.min_depth.map_or(true, |d| v.depth >= d))
            .collect()
    };
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    let views: Vec<NeuronView> = views
        .into_iter()
        .skip(req.offset)
        .take(req.limit.max(1))
        .collect();

    for view in &views {
        let _ = fire_neuron(shared, &view.id);
    }
    Ok(OpOutput::Neurons(views))
}

fn handle_decay(shared: &Shared) -> QubicResult<OpOutput> {
    let now = Utc::now();
    let (rate, handles) = {
        let m = shared.matrix.read();
        (m.params.decay_rate, m.neuron_handles())
    };
    handles.par_iter().for_each(|(_, h)| h.write().decay(rate, now));

    shared.engine.decay_all();
    let pruned = shared.engine.prune_dead_synapses();
    Ok(OpOutput::Count(pruned))
}

fn handle_consolidate(shared: &Shared) -> QubicResult<OpOutput> {
    let cfg = shared.engine.config();
    let now = Utc::now();
    let handles = shared.matrix.read().neuron_handles();
    let mut promoted = 0usize;
    for (_, handle) in handles {
        let mut n = handle.write();
        let old_enough = (now - n.created_at).num_hours() >= cfg.consolidation_age_hours;
        if n.access_count >= cfg.consolidation_access_threshold
            && old_enough
            && n.energy < cfg.consolidation_energy_ceiling
        {
            n.depth += 1;
            promoted += 1;
        }
    }

    shared.engine.self_tune();
    {
        let mut m = shared.matrix.write();
        m.last_consolidation = now;
        m.touch();
    }
    if promoted > 0 {
        tracing::debug!("{}: consolidated {promoted} neurons", shared.index_id);
    }
    Ok(OpOutput::Count(promoted))
}

fn handle_prune(shared: &Shared) -> QubicResult<OpOutput> {
    let dormant: Vec<String> = {
        let m = shared.matrix.read();
        m.neuron_handles()
            .into_iter()
            .filter(|(_, h)| h.read().is_dormant())
            .map(|(id, _)| id)
            .collect()
    };
    let mut removed = 0usize;
    if !dormant.is_empty() {
        let mut m = shared.matrix.write();
        for id in &dormant {
            if m.remove_neuron(id) {
                removed += 1;
            }
        }
    }
    shared.engine.prune_dead_synapses();
    if removed > 0 {
        tracing::debug!("{}: pruned {removed} dormant neurons", shared.index_id);
    }
    Ok(OpOutput::Count(removed))
}

/// Boost the neuron, bump matrix activation counters, notify the engine.
fn fire_neuron(shared: &Shared, id: &str) -> QubicResult<()> {
    let now = Utc::now();
    {
        let mut m = shared.matrix.write();
        let handle = m
            .neuron(id)
            .ok_or_else(|| QubicError::not_found(format!("neuron {id}")))?;
        handle.write().fire(now);
        m.total_activations += 1;
        m.last_activity = now;
    }
    shared.engine.on_neuron_fired(id);
    Ok(())
}

fn stats_of(shared: &Shared) -> WorkerStats {
    let m = shared.matrix.read();
    let neuron_count = m.neuron_count();
    let total_energy = m.total_energy();
    WorkerStats {
        index_id: shared.index_id.clone(),
        neuron_count,
        synapse_count: m.synapse_count(),
        total_energy,
        avg_energy: if neuron_count == 0 {
            0.0
        } else {
            total_energy / neuron_count as f64
        },
        current_dim: m.current_dim,
        version: m.version,
        total_activations: m.total_activations,
        last_activity: m.last_activity,
        last_op_unix_ms: shared.last_op_ms.load(Ordering::Relaxed),
    }
}
