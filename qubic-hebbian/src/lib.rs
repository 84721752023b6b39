//! # qubic-hebbian
//!
//! The learning engine. All structural writes to a matrix go through here:
//! co-activation detection, synapse formation and strengthening, weight
//! decay, dead-synapse pruning, fractal position updates, and parameter
//! self-tuning.

mod clustering;
mod engine;
mod tuning;

pub use engine::HebbianEngine;
