use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Holds the single-instance lock for as long as it lives.
pub struct LockGuard {
    _file: File,
}

/// Takes an exclusive lock on `path` and records our pid in it. Fails with `WouldBlock`
/// when another daemon holds the lock.
pub fn acquire_lock(path: &Path) -> std::io::Result<LockGuard> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    file.try_lock_exclusive()?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(LockGuard { _file: file })
}
