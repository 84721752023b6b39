//! # qubic-protocol
//!
//! A dispatch table from command kind to handler, with a simple document
//! matcher over a fixed projection of neuron fields. Mutation commands are
//! gated by policy and by the tenant's lifecycle state.

mod executor;
mod matcher;

pub use executor::{Handler, HandlerFuture, ProtocolExecutor};
pub use matcher::{matches, sort_docs};
