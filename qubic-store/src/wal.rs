//! Write-ahead log: `u32 LE length || payload || u32 LE CRC-32` records.
//! Put payloads carry the fully encoded matrix frame, so replay is
//! idempotent and self-contained.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use qubic_core::config::FsyncPolicy;
use qubic_core::{QubicError, QubicResult};

/// Upper bound on a single record payload; anything larger is treated as a
/// corrupt length during replay.
const MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOp {
    Put,
    Delete,
}

/// One logged mutation. `data` holds the encoded frame for puts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub op: WalOp,
    pub index_id: String,
    pub data: Option<Vec<u8>>,
}

/// Result of a sequential replay scan.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub records: Vec<WalRecord>,
    /// Byte offset of the last known-good record boundary.
    pub valid_len: u64,
    /// True when a malformed or truncated tail was found past `valid_len`.
    pub truncated_tail: bool,
}

/// Append handle over the log file.
pub struct Wal {
    path: PathBuf,
    file: File,
    policy: FsyncPolicy,
    fsync_interval: Duration,
    last_sync: Instant,
}

impl Wal {
    /// Open the log for appending, creating it if absent.
    pub fn open(path: &Path, policy: FsyncPolicy, fsync_interval: Duration) -> QubicResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(QubicError::persist)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            policy,
            fsync_interval,
            last_sync: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. The append must succeed before any data file is
    /// touched; errors here abort the caller's operation.
    pub fn append(&mut self, record: &WalRecord) -> QubicResult<()> {
        let payload = bincode::serialize(record).map_err(QubicError::persist)?;
        let crc = crc32fast::hash(&payload);

        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&buf).map_err(QubicError::persist)?;
        self.maybe_sync()
    }

    /// Force the log to disk.
    pub fn sync(&mut self) -> QubicResult<()> {
        self.file.sync_all().map_err(QubicError::persist)?;
        self.last_sync = Instant::now();
        Ok(())
    }

    fn maybe_sync(&mut self) -> QubicResult<()> {
        match self.policy {
            FsyncPolicy::Always => self.sync(),
            FsyncPolicy::Interval => {
                if self.last_sync.elapsed() >= self.fsync_interval {
                    self.sync()
                } else {
                    Ok(())
                }
            }
            FsyncPolicy::Off => Ok(()),
        }
    }

    /// Scan a log file sequentially, stopping at the first malformed
    /// length, truncated tail, or CRC mismatch.
    pub fn replay_file(path: &Path) -> QubicResult<ReplayOutcome> {
        let mut bytes = Vec::new();
        match File::open(path) {
            Ok(mut f) => {
                f.read_to_end(&mut bytes).map_err(QubicError::load)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayOutcome {
                    records: Vec::new(),
                    valid_len: 0,
                    truncated_tail: false,
                });
            }
            Err(e) => return Err(QubicError::load(e)),
        }

        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut truncated_tail = false;

        while offset < bytes.len() {
            let remaining = &bytes[offset..];
            if remaining.len() < 4 {
                truncated_tail = true;
                break;
            }
            let len = u32::from_le_bytes(remaining[0..4].try_into().unwrap());
            if len == 0 || len > MAX_RECORD_LEN {
                truncated_tail = true;
                break;
            }
            let len = len as usize;
            if remaining.len() < 4 + len + 4 {
                truncated_tail = true;
                break;
            }
            let payload = &remaining[4..4 + len];
            let stored_crc = u32::from_le_bytes(remaining[4 + len..4 + len + 4].try_into().unwrap());
            if crc32fast::hash(payload) != stored_crc {
                truncated_tail = true;
                break;
            }
            match bincode::deserialize::<WalRecord>(payload) {
                Ok(record) => records.push(record),
                Err(_) => {
                    truncated_tail = true;
                    break;
                }
            }
            offset += 4 + len + 4;
        }

        Ok(ReplayOutcome {
            records,
            valid_len: offset as u64,
            truncated_tail,
        })
    }

    /// Cut a corrupt tail off the log. The only legitimate WAL truncation.
    pub fn truncate_to(path: &Path, valid_len: u64) -> QubicResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(QubicError::persist)?;
        file.set_len(valid_len).map_err(QubicError::persist)?;
        file.sync_all().map_err(QubicError::persist)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_wal_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("wal.log")
    }

    fn put(id: &str, data: &[u8]) -> WalRecord {
        WalRecord {
            op: WalOp::Put,
            index_id: id.to_string(),
            data: Some(data.to_vec()),
        }
    }

    #[test]
    fn append_then_replay_returns_records_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = temp_wal_path(&dir);
        let mut wal = Wal::open(&path, FsyncPolicy::Always, Duration::from_millis(1)).unwrap();
        wal.append(&put("a", b"one")).unwrap();
        wal.append(&WalRecord {
            op: WalOp::Delete,
            index_id: "a".into(),
            data: None,
        })
        .unwrap();
        wal.append(&put("b", b"two")).unwrap();

        let outcome = Wal::replay_file(&path).unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert!(!outcome.truncated_tail);
        assert_eq!(outcome.records[0].index_id, "a");
        assert_eq!(outcome.records[1].op, WalOp::Delete);
        assert_eq!(outcome.records[2].data.as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn replay_of_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let outcome = Wal::replay_file(&temp_wal_path(&dir)).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.valid_len, 0);
        assert!(!outcome.truncated_tail);
    }

    #[test]
    fn corrupt_crc_stops_the_scan_at_the_last_good_boundary() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = temp_wal_path(&dir);
        let mut wal = Wal::open(&path, FsyncPolicy::Always, Duration::from_millis(1)).unwrap();
        wal.append(&put("good", b"kept")).unwrap();
        let good_len = std::fs::metadata(&path).unwrap().len();
        wal.append(&put("bad", b"corrupted")).unwrap();
        drop(wal);

        // Flip one byte inside the second record's payload.
        let mut bytes = std::fs::read(&path).unwrap();
        let idx = good_len as usize + 6;
        bytes[idx] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let outcome = Wal::replay_file(&path).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].index_id, "good");
        assert_eq!(outcome.valid_len, good_len);
        assert!(outcome.truncated_tail);

        Wal::truncate_to(&path, outcome.valid_len).unwrap();
        let again = Wal::replay_file(&path).unwrap();
        assert_eq!(again.records.len(), 1);
        assert!(!again.truncated_tail);
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = temp_wal_path(&dir);
        let mut wal = Wal::open(&path, FsyncPolicy::Always, Duration::from_millis(1)).unwrap();
        wal.append(&put("whole", b"record")).unwrap();
        drop(wal);

        // Simulate a crash mid-append: a dangling length prefix.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[42, 0, 0]).unwrap();
        drop(f);

        let outcome = Wal::replay_file(&path).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.truncated_tail);
    }

    #[test]
    fn replay_twice_yields_identical_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = temp_wal_path(&dir);
        let mut wal = Wal::open(&path, FsyncPolicy::Always, Duration::from_millis(1)).unwrap();
        for i in 0..10 {
            wal.append(&put(&format!("t{i}"), &[i as u8; 16])).unwrap();
        }
        let a = Wal::replay_file(&path).unwrap();
        let b = Wal::replay_file(&path).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.valid_len, b.valid_len);
    }
}
