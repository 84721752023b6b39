use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// When the store fsyncs the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// Sync after every append. Slowest, loses nothing.
    Always,
    /// Sync when at least `fsync_interval_ms` has elapsed since the last
    /// sync. May lose the most recent interval on crash.
    Interval,
    /// Never sync explicitly; the OS decides.
    Off,
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory holding data/, manifest/, checkpoints/, wal.log.
    pub base_path: PathBuf,
    /// When false, saves go straight to data files with no log.
    pub wal_enabled: bool,
    pub fsync_policy: FsyncPolicy,
    /// Used when `fsync_policy` is `Interval`.
    pub fsync_interval_ms: u64,
    /// Period between background integrity scans; 0 disables them.
    pub checksum_validation_interval_secs: u64,
    /// Rebuild the index and delete corrupt data files at startup.
    pub startup_repair: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("qubic-data"),
            wal_enabled: true,
            fsync_policy: FsyncPolicy::Interval,
            fsync_interval_ms: 100,
            checksum_validation_interval_secs: 0,
            startup_repair: true,
        }
    }
}
