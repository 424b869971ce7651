//! Host-wide mutual exclusion: one sweeping process per base directory.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{io_err, DaemonError};

/// An exclusive lock on the pid file, released on drop.
#[derive(Debug)]
pub struct HostLock {
    file: File,
    path: PathBuf,
}

impl HostLock {
    /// Take the lock at `path`, writing our pid into it. `Ok(None)` when
    /// another process holds it.
    pub fn acquire(path: &Path) -> Result<Option<HostLock>, DaemonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        file.set_len(0).map_err(|e| io_err(path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_err(path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| io_err(path, e))?;
        file.sync_all().map_err(|e| io_err(path, e))?;
        debug!(path = %path.display(), "host lock acquired");

        Ok(Some(HostLock {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// As [`HostLock::acquire`], with a held lock reported as
    /// [`DaemonError::LockHeld`].
    pub fn require(path: &Path) -> Result<HostLock, DaemonError> {
        Self::acquire(path)?.ok_or_else(|| DaemonError::LockHeld {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "host lock released");
    }
}
