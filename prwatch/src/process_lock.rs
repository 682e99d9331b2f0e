//! Advisory run lock.
//!
//! Commands that write the data table or artifacts hold an exclusive `flock`
//! on a lock file scoped to the data file path, so an overlapping scheduled
//! run fails fast instead of interleaving writes. The lock lives in
//! `$XDG_RUNTIME_DIR/prwatch/` (or the temp dir) and is released on drop.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const RUN_LOCK_FILE: &str = "prwatch-run.lock";

/// Held for the duration of a run.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the run lock for `data_file`, failing if another run holds it.
pub fn acquire_run_lock(data_file: &Path) -> Result<RunLock> {
    match try_acquire_lock(RUN_LOCK_FILE, data_file)? {
        Some(lock) => Ok(lock),
        None => anyhow::bail!(
            "another prwatch run is already using {}",
            data_file.display()
        ),
    }
}

fn try_acquire_lock(filename: &str, data_file: &Path) -> Result<Option<RunLock>> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(filename, data_file));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            // Owner info for debugging.
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();

            Ok(Some(RunLock { file, path }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("prwatch");
    dir
}

/// Lock file name unique to the (absolute) data file path.
fn scoped_lock_filename(base_filename: &str, data_file: &Path) -> String {
    let absolute = std::path::absolute(data_file).unwrap_or_else(|_| data_file.to_path_buf());
    let mut hasher = DefaultHasher::new();
    absolute.to_string_lossy().hash(&mut hasher);
    let digest = hasher.finish();
    format!("{base_filename}.{digest:016x}")
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
unsafe extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("prwatch run locks currently require Unix (macOS/Linux)");
