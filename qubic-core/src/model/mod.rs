//! Data model: neurons, synapses, matrices, lifecycle records, snapshots.

pub mod brain_state;
pub mod matrix;
pub mod neuron;
pub mod snapshot;
pub mod synapse;

pub use brain_state::{BrainState, LifecycleState};
pub use matrix::{LearnedParams, Matrix, MatrixBounds, MatrixData};
pub use neuron::Neuron;
pub use snapshot::MatrixSnapshot;
pub use synapse::{synapse_id, Synapse};
