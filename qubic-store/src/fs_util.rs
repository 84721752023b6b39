//! Atomic file replacement: write a `.tmp` sibling, optionally fsync, rename
//! over the destination, then best-effort fsync the directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use qubic_core::{QubicError, QubicResult};

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8], sync: bool) -> QubicResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| QubicError::persist(format!("bad path {}", path.display())))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(QubicError::persist)?;
        f.write_all(bytes).map_err(QubicError::persist)?;
        if sync {
            f.sync_all().map_err(QubicError::persist)?;
        }
    }

    fs::rename(&tmp, path).map_err(QubicError::persist)?;

    if sync {
        sync_dir(path);
    }
    Ok(())
}

/// Fsync the parent directory so the rename itself is durable. Not every
/// platform supports opening a directory for sync; failures are ignored.
pub fn sync_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
