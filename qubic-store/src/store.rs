//! The store facade. Owns the WAL, the snapshot index, and the pending
//! (coalesced) writes map.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use qubic_core::config::{FsyncPolicy, StoreConfig};
use qubic_core::model::{Matrix, MatrixData, MatrixSnapshot};
use qubic_core::{QubicError, QubicResult};

use crate::fs_util::atomic_write;
use crate::integrity::{self, IntegrityReport};
use crate::manifest;
use crate::wal::{Wal, WalOp, WalRecord};

/// Crash-consistent store for matrix frames, one file per tenant.
pub struct NeuroStore {
    cfg: StoreConfig,
    base: PathBuf,
    wal: Option<Mutex<Wal>>,
    snapshots: RwLock<HashMap<String, MatrixSnapshot>>,
    /// Tenants with an encoded-but-unflushed frame, keyed by index id.
    pending: Mutex<HashMap<String, (MatrixSnapshot, Vec<u8>)>>,
    manifest_version: AtomicU64,
}

impl NeuroStore {
    /// Open (or create) the store at `cfg.base_path`, replaying the WAL and
    /// repairing as configured.
    pub fn open(cfg: StoreConfig) -> QubicResult<Self> {
        let base = cfg.base_path.clone();
        for sub in ["data", "manifest", "checkpoints"] {
            fs::create_dir_all(base.join(sub)).map_err(QubicError::persist)?;
        }

        let (version, snapshots) = match manifest::read_index(&base) {
            Some((version, list)) => {
                tracing::info!(
                    "manifest resolved: version {version}, {} tenants",
                    list.len()
                );
                let map = list.into_iter().map(|s| (s.index_id.clone(), s)).collect();
                (version, map)
            }
            None => {
                tracing::info!("no usable manifest, rebuilding index from data/");
                (0, integrity::scan_snapshots(&base))
            }
        };

        let store = Self {
            cfg,
            base,
            wal: None,
            snapshots: RwLock::new(snapshots),
            pending: Mutex::new(HashMap::new()),
            manifest_version: AtomicU64::new(version),
        };

        let store = store.replay_wal()?;

        if store.cfg.startup_repair {
            let report = store.validate_data_files(true)?;
            if report.corrupt > 0 {
                tracing::warn!(
                    "startup repair: {} corrupt of {} checked, {} removed",
                    report.corrupt,
                    report.checked,
                    report.repaired
                );
            }
        }

        Ok(store)
    }

    fn replay_wal(mut self) -> QubicResult<Self> {
        let wal_path = self.base.join("wal.log");
        if self.cfg.wal_enabled {
            let outcome = Wal::replay_file(&wal_path)?;
            if outcome.truncated_tail {
                tracing::warn!(
                    "wal tail corrupt, truncating to {} bytes",
                    outcome.valid_len
                );
                Wal::truncate_to(&wal_path, outcome.valid_len)?;
            }
            if !outcome.records.is_empty() {
                tracing::info!("replaying {} wal records", outcome.records.len());
                for record in &outcome.records {
                    self.apply_replayed(record)?;
                }
                self.persist_index()?;
            }
            let wal = Wal::open(
                &wal_path,
                self.cfg.fsync_policy,
                Duration::from_millis(self.cfg.fsync_interval_ms),
            )?;
            self.wal = Some(Mutex::new(wal));
        }
        Ok(self)
    }

    fn apply_replayed(&self, record: &WalRecord) -> QubicResult<()> {
        match record.op {
            WalOp::Put => {
                let Some(frame) = record.data.as_deref() else {
                    tracing::warn!("put record for {} carries no frame", record.index_id);
                    return Ok(());
                };
                // Replay is idempotent: decode to refresh the snapshot,
                // rewrite the data file unconditionally.
                let path = match self.data_path(&record.index_id) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("skipping replayed record with bad id: {e}");
                        return Ok(());
                    }
                };
                match qubic_codec::decode(frame) {
                    Ok(data) => {
                        atomic_write(&path, frame, self.sync_files())?;
                        self.snapshots
                            .write()
                            .insert(record.index_id.clone(), snapshot_of(&data));
                    }
                    Err(e) => {
                        tracing::warn!("replayed frame for {} undecodable: {e}", record.index_id);
                    }
                }
            }
            WalOp::Delete => {
                let path = self.data_path(&record.index_id)?;
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(QubicError::persist(e)),
                }
                self.snapshots.write().remove(&record.index_id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Contract surface
    // ------------------------------------------------------------------

    /// Persist one matrix immediately, bypassing coalescing.
    pub fn save(&self, matrix: &Matrix) -> QubicResult<()> {
        let data = matrix.snapshot_data();
        validate_index_id(&data.index_id)?;
        let snap = snapshot_of(&data);
        let index_id = data.index_id.clone();
        let frame = qubic_codec::encode(&data, true)?;

        self.wal_append(WalRecord {
            op: WalOp::Put,
            index_id: index_id.clone(),
            data: Some(frame.clone()),
        })?;

        // A failure past this point is returned, but the WAL already holds
        // the frame; replay completes the write on the next boot.
        atomic_write(&self.data_path(&index_id)?, &frame, self.sync_files())?;
        self.pending.lock().remove(&index_id);
        self.snapshots.write().insert(index_id, snap);
        self.persist_index()
    }

    /// Log the matrix now, defer the data-file write until the next flush.
    pub fn save_async(&self, matrix: &Matrix) -> QubicResult<()> {
        let data = matrix.snapshot_data();
        validate_index_id(&data.index_id)?;
        let snap = snapshot_of(&data);
        let index_id = data.index_id.clone();
        let frame = qubic_codec::encode(&data, true)?;

        self.wal_append(WalRecord {
            op: WalOp::Put,
            index_id: index_id.clone(),
            data: Some(frame.clone()),
        })?;

        self.pending.lock().insert(index_id, (snap, frame));
        Ok(())
    }

    /// Load a tenant's matrix. Pending (coalesced) state wins over the file.
    pub fn load(&self, index_id: &str) -> QubicResult<MatrixData> {
        if let Some((_, frame)) = self.pending.lock().get(index_id) {
            return qubic_codec::decode(frame);
        }
        let path = self.data_path(index_id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QubicError::not_found(format!("matrix {index_id}")));
            }
            Err(e) => return Err(QubicError::load(e)),
        };
        qubic_codec::decode(&bytes)
    }

    pub fn exists(&self, index_id: &str) -> bool {
        if self.pending.lock().contains_key(index_id) {
            return true;
        }
        if self.snapshots.read().contains_key(index_id) {
            return true;
        }
        self.data_path(index_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// Remove a tenant's persistent state.
    pub fn delete(&self, index_id: &str) -> QubicResult<()> {
        validate_index_id(index_id)?;
        self.wal_append(WalRecord {
            op: WalOp::Delete,
            index_id: index_id.to_string(),
            data: None,
        })?;

        self.pending.lock().remove(index_id);
        let path = self.data_path(index_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(QubicError::persist(e)),
        }
        self.snapshots.write().remove(index_id);
        self.persist_index()
    }

    /// All known tenant ids, sorted.
    pub fn list_indexes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshots.read().keys().cloned().collect();
        for id in self.pending.lock().keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids.sort();
        ids
    }

    /// Write every pending frame to its data file and re-persist the index.
    pub fn flush_all(&self) -> QubicResult<()> {
        let drained: Vec<(String, (MatrixSnapshot, Vec<u8>))> =
            self.pending.lock().drain().collect();
        if drained.is_empty() {
            self.sync_wal()?;
            return Ok(());
        }
        tracing::info!("flushing {} pending tenants", drained.len());
        let mut last_err = None;
        for (index_id, (snap, frame)) in drained {
            match self
                .data_path(&index_id)
                .and_then(|p| atomic_write(&p, &frame, self.sync_files()))
            {
                Ok(()) => {
                    self.snapshots.write().insert(index_id, snap);
                }
                Err(e) => {
                    tracing::warn!("flush of {index_id} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        self.persist_index()?;
        self.sync_wal()?;
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Decode every data file, reporting (and optionally deleting) corrupt
    /// ones.
    pub fn validate_data_files(&self, repair: bool) -> QubicResult<IntegrityReport> {
        let report = integrity::validate(&self.base, repair)?;
        if repair && report.repaired > 0 {
            // Prune orphaned snapshot entries and rewrite the manifest.
            let live = integrity::scan_snapshots(&self.base);
            {
                let mut snaps = self.snapshots.write();
                snaps.retain(|id, _| live.contains_key(id));
            }
            self.persist_index()?;
        }
        Ok(report)
    }

    /// Spawn the optional background loops: periodic WAL sync (policy =
    /// Interval) and the periodic integrity scan.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        mut cancel: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.cfg.wal_enabled && self.cfg.fsync_policy == FsyncPolicy::Interval {
            let store = Arc::clone(self);
            let mut cancel_rx = cancel.clone();
            let interval = Duration::from_millis(self.cfg.fsync_interval_ms.max(1));
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(e) = store.sync_wal() {
                                tracing::warn!("periodic wal sync failed: {e}");
                            }
                        }
                        _ = cancel_rx.changed() => break,
                    }
                }
            }));
        }

        if self.cfg.checksum_validation_interval_secs > 0 {
            let store = Arc::clone(self);
            let interval = Duration::from_secs(self.cfg.checksum_validation_interval_secs);
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            match store.validate_data_files(false) {
                                Ok(report) if report.corrupt > 0 => {
                                    tracing::warn!(
                                        "integrity scan: {} corrupt of {}",
                                        report.corrupt,
                                        report.checked
                                    );
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!("integrity scan failed: {e}"),
                            }
                        }
                        _ = cancel.changed() => break,
                    }
                }
            }));
        }

        handles
    }

    /// Snapshot-index entry for one tenant, if known.
    pub fn snapshot(&self, index_id: &str) -> Option<MatrixSnapshot> {
        if let Some((snap, _)) = self.pending.lock().get(index_id) {
            return Some(snap.clone());
        }
        self.snapshots.read().get(index_id).cloned()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn wal_append(&self, record: WalRecord) -> QubicResult<()> {
        if let Some(wal) = &self.wal {
            wal.lock().append(&record)?;
        }
        Ok(())
    }

    fn sync_wal(&self) -> QubicResult<()> {
        if let Some(wal) = &self.wal {
            if self.cfg.fsync_policy != FsyncPolicy::Off {
                wal.lock().sync()?;
            }
        }
        Ok(())
    }

    fn sync_files(&self) -> bool {
        self.cfg.fsync_policy == FsyncPolicy::Always
    }

    fn persist_index(&self) -> QubicResult<()> {
        let version = self.manifest_version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut list: Vec<MatrixSnapshot> = self.snapshots.read().values().cloned().collect();
        list.sort_by(|a, b| a.index_id.cmp(&b.index_id));
        manifest::write_index(&self.base, version, &list, self.sync_files())
    }

    fn data_path(&self, index_id: &str) -> QubicResult<PathBuf> {
        validate_index_id(index_id)?;
        Ok(self.base.join("data").join(format!("{index_id}.nrdb")))
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }
}

fn snapshot_of(data: &MatrixData) -> MatrixSnapshot {
    MatrixSnapshot {
        index_id: data.index_id.clone(),
        version: data.version,
        neuron_count: data.neurons.len(),
        synapse_count: data.synapses.len(),
        current_dim: data.current_dim,
        total_energy: data.neurons.iter().map(|n| n.energy).sum(),
        modified_at_unix: data.modified_at.timestamp(),
    }
}

/// Index ids become file names; reject anything that could escape `data/`.
fn validate_index_id(index_id: &str) -> QubicResult<()> {
    if index_id.is_empty() || index_id.len() > 255 {
        return Err(QubicError::invalid("index id must be 1..=255 chars"));
    }
    if !index_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || index_id.starts_with('.')
    {
        return Err(QubicError::invalid(format!(
            "index id {index_id:?} contains unsupported characters"
        )));
    }
    Ok(())
}
