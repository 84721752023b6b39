use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};

use qubic_brain::{
    AddNeuron, BrainWorker, NeuronView, OpOutput, Operation, SearchRequest, UpdateNeuron,
};
use qubic_core::model::LifecycleState;
use qubic_core::{QubicError, QubicResult};
use qubic_lifecycle::LifecycleManager;

pub type HandlerFuture = Pin<Box<dyn Future<Output = QubicResult<Value>> + Send>>;

/// One command handler. Kind-based gating happens before dispatch, so a
/// replacement handler cannot accidentally open the mutation surface.
pub type Handler = Arc<dyn Fn(Arc<BrainWorker>, Value) -> HandlerFuture + Send + Sync>;

const MUTATION_COMMANDS: &[&str] = &["update", "updateOne", "delete", "deleteOne", "activate"];

/// Dispatch table from command kind to handler.
pub struct ProtocolExecutor {
    handlers: RwLock<HashMap<String, Handler>>,
    enable_mutations: bool,
    lifecycle: Option<Arc<LifecycleManager>>,
}

impl ProtocolExecutor {
    pub fn new(enable_mutations: bool) -> Self {
        let executor = Self {
            handlers: RwLock::new(HashMap::new()),
            enable_mutations,
            lifecycle: None,
        };
        executor.register_builtins();
        executor
    }

    /// Wire the lifecycle manager so mutation commands respect sleep.
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleManager>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Register or replace a handler by kind.
    pub fn register(&self, kind: impl Into<String>, handler: Handler) {
        self.handlers.write().insert(kind.into(), handler);
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Execute one command against a worker.
    pub async fn execute(
        &self,
        worker: Arc<BrainWorker>,
        command: &str,
        args: Value,
    ) -> QubicResult<Value> {
        if MUTATION_COMMANDS.contains(&command) {
            if !self.enable_mutations {
                return Err(QubicError::invalid(format!(
                    "mutation command {command} is disabled by policy"
                )));
            }
            if let Some(lifecycle) = &self.lifecycle {
                let state = lifecycle.state(worker.index_id());
                if matches!(
                    state,
                    Some(LifecycleState::Sleeping) | Some(LifecycleState::Dormant)
                ) {
                    return Err(QubicError::BrainSleeping {
                        index_id: worker.index_id().to_string(),
                    });
                }
            }
        }

        let handler = self
            .handlers
            .read()
            .get(command)
            .cloned()
            .ok_or_else(|| QubicError::invalid(format!("unknown command {command}")))?;
        handler(worker, args).await
    }

    fn register_builtins(&self) {
        self.register("insert", Arc::new(|w, a| Box::pin(insert(w, a))));
        self.register("find", Arc::new(|w, a| Box::pin(find(w, a))));
        self.register("findOne", Arc::new(|w, a| Box::pin(find_one(w, a))));
        self.register("update", Arc::new(|w, a| Box::pin(update(w, a, false))));
        self.register("updateOne", Arc::new(|w, a| Box::pin(update(w, a, true))));
        self.register("delete", Arc::new(|w, a| Box::pin(delete(w, a, false))));
        self.register("deleteOne", Arc::new(|w, a| Box::pin(delete(w, a, true))));
        self.register("count", Arc::new(|w, a| Box::pin(count(w, a))));
        self.register("activate", Arc::new(|w, a| Box::pin(activate(w, a))));
        self.register("search", Arc::new(|w, a| Box::pin(search(w, a))));
        self.register("stats", Arc::new(|w, a| Box::pin(stats(w, a))));
    }
}

// ----------------------------------------------------------------------
// Built-in handlers
// ----------------------------------------------------------------------

async fn insert(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let content = args
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| QubicError::invalid("insert requires a content string"))?;
    let tags = args
        .get("tags")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let parent_id = args
        .get("parent_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let out = worker
        .submit(Operation::Write(AddNeuron {
            content: content.to_string(),
            parent_id,
            tags,
            base_energy: args.get("base_energy").and_then(Value::as_f64),
        }))
        .await?;
    match out {
        OpOutput::Neuron(view) => Ok(json!({"inserted": project(&view)})),
        _ => Err(QubicError::invalid("unexpected insert result")),
    }
}

async fn find(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let docs = query_docs(&worker, &args)?;
    Ok(Value::Array(docs))
}

async fn find_one(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let docs = query_docs(&worker, &args)?;
    Ok(docs.into_iter().next().unwrap_or(Value::Null))
}

async fn update(worker: Arc<BrainWorker>, args: Value, single: bool) -> QubicResult<Value> {
    let set = args
        .get("update")
        .and_then(|u| u.get("$set"))
        .and_then(Value::as_object)
        .ok_or_else(|| QubicError::invalid("update requires {update: {$set: {...}}}"))?;
    let content = set
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| QubicError::invalid("only content can be $set"))?;

    let matched = matching_ids(&worker, &args)?;
    let targets: Vec<String> = if single {
        matched.into_iter().take(1).collect()
    } else {
        matched
    };

    let mut modified = 0usize;
    for id in &targets {
        worker
            .submit(Operation::Touch(UpdateNeuron {
                id: id.clone(),
                content: content.to_string(),
            }))
            .await?;
        modified += 1;
    }
    Ok(json!({"matched": targets.len(), "modified": modified}))
}

async fn delete(worker: Arc<BrainWorker>, args: Value, single: bool) -> QubicResult<Value> {
    let matched = matching_ids(&worker, &args)?;
    let targets: Vec<String> = if single {
        matched.into_iter().take(1).collect()
    } else {
        matched
    };
    let mut deleted = 0usize;
    for id in &targets {
        worker.submit(Operation::Forget { id: id.clone() }).await?;
        deleted += 1;
    }
    Ok(json!({"deleted": deleted}))
}

async fn count(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let matched = matching_ids(&worker, &args)?;
    Ok(json!({"count": matched.len()}))
}

async fn activate(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let id = args
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| QubicError::invalid("activate requires an id"))?;
    worker
        .submit(Operation::Fire { id: id.to_string() })
        .await?;
    Ok(json!({"activated": id}))
}

async fn search(worker: Arc<BrainWorker>, args: Value) -> QubicResult<Value> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| QubicError::invalid("search requires a query string"))?;
    let mut request = SearchRequest::simple(query);
    if let Some(depth) = args.get("depth").and_then(Value::as_u64) {
        request.depth = depth as u32;
    }
    if let Some(limit) = args.get("limit").and_then(Value::as_u64) {
        request.limit = limit as usize;
    }
    if let Some(tags) = args.get("tags").and_then(Value::as_array) {
        request.tags = tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    request.strict = args
        .get("strict")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let out = worker.submit(Operation::Search(request)).await?;
    match out {
        OpOutput::Hits(hits) => Ok(Value::Array(
            hits.iter()
                .map(|h| json!({"score": h.score, "hops": h.hops, "neuron": project(&h.neuron)}))
                .collect(),
        )),
        _ => Err(QubicError::invalid("unexpected search result")),
    }
}

async fn stats(worker: Arc<BrainWorker>, _args: Value) -> QubicResult<Value> {
    let out = worker.submit(Operation::GetStats).await?;
    match out {
        OpOutput::Stats(stats) => serde_json::to_value(stats).map_err(QubicError::persist),
        _ => Err(QubicError::invalid("unexpected stats result")),
    }
}

// ----------------------------------------------------------------------
// Query plumbing
// ----------------------------------------------------------------------

/// The fixed projection the matcher sees.
fn project(view: &NeuronView) -> Value {
    json!({
        "id": view.id,
        "content": view.content,
        "energy": view.energy,
        "base_energy": view.base_energy,
        "depth": view.depth,
        "access_count": view.access_count,
        "tags": view.tags,
        "created_at": view.created_at.to_rfc3339(),
        "last_fired_at": view.last_fired_at.to_rfc3339(),
        "sentiment_label": view.sentiment_label,
        "sentiment_score": view.sentiment_score,
    })
}

/// Filter + sort + offset/limit over the matrix, read-only. Reads
/// cooperate via the matrix read lock and never touch the worker queue.
fn query_docs(worker: &BrainWorker, args: &Value) -> QubicResult<Vec<Value>> {
    let filter = args.get("filter").cloned().unwrap_or_else(|| json!({}));
    let matrix = worker.matrix();
    let mut docs: Vec<Value> = {
        let m = matrix.read();
        m.neuron_handles()
            .into_iter()
            .map(|(_, h)| project(&NeuronView::from(&*h.read())))
            .collect()
    };
    let mut filtered = Vec::with_capacity(docs.len());
    for doc in docs.drain(..) {
        if crate::matcher::matches(&doc, &filter)? {
            filtered.push(doc);
        }
    }
    crate::matcher::sort_docs(&mut filtered, args.get("sort"));

    let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .map(|l| l as usize)
        .unwrap_or(usize::MAX);
    Ok(filtered.into_iter().skip(offset).take(limit).collect())
}

fn matching_ids(worker: &BrainWorker, args: &Value) -> QubicResult<Vec<String>> {
    Ok(query_docs(worker, args)?
        .into_iter()
        .filter_map(|d| d.get("id").and_then(Value::as_str).map(str::to_string))
        .collect())
}
