//! # qubic-pool
//!
//! Multiplexes many tenant workers over one store. Workers are created
//! lazily on first access, loaded from disk when the tenant exists, and
//! evicted (with a final persist) once idle.

mod pool;

pub use pool::{BrainPool, PoolStats};
