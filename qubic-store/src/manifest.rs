//! Manifest/checkpoint chain: `manifest/CURRENT` names the live manifest,
//! the manifest names the checkpoint, the checkpoint holds the snapshot
//! index. Each link is replaced atomically, newest last.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use qubic_core::model::MatrixSnapshot;
use qubic_core::QubicResult;

use crate::fs_util::atomic_write;

/// `manifest/MANIFEST-<20d>.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub version: u64,
    /// Path of the checkpoint blob, relative to the store base.
    pub checkpoint: String,
    pub created_at_unix: i64,
}

pub fn manifest_name(version: u64) -> String {
    format!("MANIFEST-{version:020}.json")
}

pub fn checkpoint_rel_path(version: u64) -> String {
    format!("checkpoints/checkpoint-{version:020}.nrdb")
}

/// Write the snapshot index at `version`: checkpoint blob first, then the
/// manifest, then the `CURRENT` pointer.
pub fn write_index(
    base: &Path,
    version: u64,
    snapshots: &[MatrixSnapshot],
    sync: bool,
) -> QubicResult<()> {
    let checkpoint_rel = checkpoint_rel_path(version);
    let blob = serde_json::to_vec_pretty(snapshots).map_err(qubic_core::QubicError::persist)?;
    atomic_write(&base.join(&checkpoint_rel), &blob, sync)?;

    let record = ManifestRecord {
        version,
        checkpoint: checkpoint_rel,
        created_at_unix: Utc::now().timestamp(),
    };
    let manifest = manifest_name(version);
    let manifest_bytes =
        serde_json::to_vec_pretty(&record).map_err(qubic_core::QubicError::persist)?;
    atomic_write(&base.join("manifest").join(&manifest), &manifest_bytes, sync)?;

    // CURRENT holds exactly one line: the live manifest's file name.
    let current = format!("{manifest}\n");
    atomic_write(&base.join("manifest").join("CURRENT"), current.as_bytes(), sync)?;
    Ok(())
}

/// Resolve `CURRENT` -> manifest -> checkpoint. Returns `None` on any
/// missing or corrupt link; the caller falls back to scanning `data/`.
pub fn read_index(base: &Path) -> Option<(u64, Vec<MatrixSnapshot>)> {
    let current = base.join("manifest").join("CURRENT");
    let name = match fs::read_to_string(&current) {
        Ok(s) => s.trim().to_string(),
        Err(_) => return None,
    };

    let manifest_bytes = match fs::read(base.join("manifest").join(&name)) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("manifest {name} unreadable: {e}");
            return None;
        }
    };
    let record: ManifestRecord = match serde_json::from_slice(&manifest_bytes) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("manifest {name} corrupt: {e}");
            return None;
        }
    };

    let blob = match fs::read(base.join(&record.checkpoint)) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("checkpoint {} unreadable: {e}", record.checkpoint);
            return None;
        }
    };
    match serde_json::from_slice::<Vec<MatrixSnapshot>>(&blob) {
        Ok(snapshots) => Some((record.version, snapshots)),
        Err(e) => {
            tracing::warn!("checkpoint {} corrupt: {e}", record.checkpoint);
            None
        }
    }
}
