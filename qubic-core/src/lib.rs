//! # qubic-core
//!
//! Foundation crate for the QubicDB memory system.
//! Defines the data model, errors, config, constants, and provider traits.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod model;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::QubicConfig;
pub use errors::{QubicError, QubicResult};
pub use model::{BrainState, LifecycleState, Matrix, MatrixData, MatrixSnapshot, Neuron, Synapse};
