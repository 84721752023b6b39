//! # qubic-registry
//!
//! The trust boundary for the worker pool: a uuid allowlist persisted as a
//! pretty-printed `registry.json`. Every mutation rewrites the file
//! atomically and rolls the in-memory map back when the write fails.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use qubic_core::{QubicError, QubicResult};

/// One registered tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub uuid: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The allowlist. Entries outlive individual worker sessions.
pub struct Registry {
    path: PathBuf,
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl Registry {
    /// Load `registry.json` from the given file path, starting empty when
    /// the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> QubicResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<RegistryEntry> =
                    serde_json::from_slice(&bytes).map_err(QubicError::load)?;
                tracing::info!("registry loaded: {} tenants", list.len());
                list.into_iter().map(|e| (e.uuid.clone(), e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(QubicError::load(e)),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Register a new tenant. `Conflict` if the uuid already exists.
    pub fn create(&self, uuid: &str, metadata: serde_json::Value) -> QubicResult<RegistryEntry> {
        validate_uuid(uuid)?;
        let now = Utc::now();
        let entry = RegistryEntry {
            uuid: uuid.to_string(),
            metadata,
            created_at: now,
            updated_at: now,
        };

        let mut entries = self.entries.write();
        if entries.contains_key(uuid) {
            return Err(QubicError::conflict(format!("uuid {uuid} already registered")));
        }
        entries.insert(uuid.to_string(), entry.clone());
        if let Err(e) = persist(&self.path, &entries) {
            entries.remove(uuid);
            return Err(e);
        }
        Ok(entry)
    }

    pub fn get(&self, uuid: &str) -> Option<RegistryEntry> {
        self.entries.read().get(uuid).cloned()
    }

    pub fn exists(&self, uuid: &str) -> bool {
        self.entries.read().contains_key(uuid)
    }

    /// All entries, ordered by creation time.
    pub fn list(&self) -> Vec<RegistryEntry> {
        let mut list: Vec<RegistryEntry> = self.entries.read().values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));
        list
    }

    /// Re-key a tenant and replace its metadata.
    pub fn update(
        &self,
        old_uuid: &str,
        new_uuid: &str,
        metadata: serde_json::Value,
    ) -> QubicResult<RegistryEntry> {
        validate_uuid(new_uuid)?;
        let mut entries = self.entries.write();
        if new_uuid != old_uuid && entries.contains_key(new_uuid) {
            return Err(QubicError::conflict(format!("uuid {new_uuid} already registered")));
        }
        let Some(previous) = entries.remove(old_uuid) else {
            return Err(QubicError::not_found(format!("uuid {old_uuid}")));
        };
        let mut entry = previous.clone();
        entry.uuid = new_uuid.to_string();
        entry.metadata = metadata;
        entry.updated_at = Utc::now();
        entries.insert(new_uuid.to_string(), entry.clone());

        if let Err(e) = persist(&self.path, &entries) {
            entries.remove(new_uuid);
            entries.insert(old_uuid.to_string(), previous);
            return Err(e);
        }
        Ok(entry)
    }

    /// Remove a tenant from the allowlist.
    pub fn delete(&self, uuid: &str) -> QubicResult<()> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(uuid) else {
            return Err(QubicError::not_found(format!("uuid {uuid}")));
        };
        if let Err(e) = persist(&self.path, &entries) {
            entries.insert(uuid.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    /// Get the entry, creating it when absent. The bool reports creation.
    pub fn find_or_create(
        &self,
        uuid: &str,
        metadata: serde_json::Value,
    ) -> QubicResult<(RegistryEntry, bool)> {
        if let Some(entry) = self.get(uuid) {
            return Ok((entry, false));
        }
        match self.create(uuid, metadata) {
            Ok(entry) => Ok((entry, true)),
            // Lost a race with a concurrent create; the entry exists now.
            Err(QubicError::Conflict { .. }) => {
                let entry = self
                    .get(uuid)
                    .ok_or_else(|| QubicError::conflict(format!("uuid {uuid} vanished")))?;
                Ok((entry, false))
            }
            Err(e) => Err(e),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn validate_uuid(uuid: &str) -> QubicResult<()> {
    uuid::Uuid::parse_str(uuid)
        .map(|_| ())
        .map_err(|_| QubicError::invalid(format!("{uuid:?} is not a valid uuid")))
}

/// Pretty-printed list, written via a tmp sibling and rename.
fn persist(path: &Path, entries: &HashMap<String, RegistryEntry>) -> QubicResult<()> {
    let mut list: Vec<&RegistryEntry> = entries.values().collect();
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));
    let bytes = serde_json::to_vec_pretty(&list).map_err(QubicError::persist)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| QubicError::persist(format!("bad registry path {}", path.display())))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(QubicError::persist)?;
        f.write_all(&bytes).map_err(QubicError::persist)?;
        f.sync_all().map_err(QubicError::persist)?;
    }
    fs::rename(&tmp, path).map_err(QubicError::persist)
}
