//! # qubic-store
//!
//! Crash-consistent persistence for matrices. One codec frame per tenant
//! under `data/`, a CRC-framed write-ahead log, and a versioned
//! manifest/checkpoint chain pointing at the snapshot index.

mod fs_util;
mod integrity;
mod manifest;
mod store;
mod wal;

pub use integrity::IntegrityReport;
pub use manifest::ManifestRecord;
pub use store::NeuroStore;
pub use wal::{ReplayOutcome, Wal, WalOp, WalRecord};
