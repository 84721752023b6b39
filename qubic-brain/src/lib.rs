//! # qubic-brain
//!
//! One worker task per tenant. The worker exclusively owns its matrix and
//! serializes every mutation through a bounded operation queue; the
//! Hebbian engine runs inside the handler so recall reinforces linkage.

mod ops;
mod search;
mod worker;

pub use ops::{
    AddNeuron, ListNeurons, NeuronView, OpOutput, Operation, SearchHit, SearchRequest,
    UpdateNeuron, WorkerStats,
};
pub use worker::BrainWorker;
