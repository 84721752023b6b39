//! Data-file integrity: decode every frame under `data/`, report corrupt
//! ones, optionally delete them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use qubic_core::model::MatrixSnapshot;
use qubic_core::{QubicError, QubicResult};

/// Outcome of one integrity scan.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub corrupt: usize,
    pub repaired: usize,
}

/// Scan all `data/*.nrdb` files. With `repair` set, corrupt files are
/// deleted.
pub fn validate(base: &Path, repair: bool) -> QubicResult<IntegrityReport> {
    let mut report = IntegrityReport::default();
    for path in data_files(base)? {
        report.checked += 1;
        let ok = fs::read(&path)
            .map_err(QubicError::load)
            .and_then(|bytes| qubic_codec::decode(&bytes))
            .is_ok();
        if ok {
            continue;
        }
        report.corrupt += 1;
        if repair {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::warn!("removed corrupt data file {}", path.display());
                    report.repaired += 1;
                }
                Err(e) => tracing::warn!("could not remove {}: {e}", path.display()),
            }
        } else {
            tracing::warn!("corrupt data file {}", path.display());
        }
    }
    Ok(report)
}

/// Rebuild the snapshot index by decoding every readable data file.
/// Undecodable files are skipped; a later repair pass deals with them.
pub fn scan_snapshots(base: &Path) -> HashMap<String, MatrixSnapshot> {
    let mut out = HashMap::new();
    let Ok(paths) = data_files(base) else {
        return out;
    };
    for path in paths {
        let Ok(bytes) = fs::read(&path) else { continue };
        match qubic_codec::decode(&bytes) {
            Ok(data) => {
                let snap = MatrixSnapshot {
                    index_id: data.index_id.clone(),
                    version: data.version,
                    neuron_count: data.neurons.len(),
                    synapse_count: data.synapses.len(),
                    current_dim: data.current_dim,
                    total_energy: data.neurons.iter().map(|n| n.energy).sum(),
                    modified_at_unix: data.modified_at.timestamp(),
                };
                out.insert(data.index_id, snap);
            }
            Err(e) => tracing::warn!("skipping undecodable {}: {e}", path.display()),
        }
    }
    out
}

fn data_files(base: &Path) -> QubicResult<Vec<std::path::PathBuf>> {
    let dir = base.join("data");
    let mut out = Vec::new();
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(QubicError::load(e)),
    };
    for entry in entries {
        let entry = entry.map_err(QubicError::load)?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("nrdb") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
