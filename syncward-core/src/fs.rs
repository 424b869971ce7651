//! Durable file writes shared by state records, queue entries and reports.
//!
//! ## `atomic_write` protocol
//!
//! 1. Write the payload to `<path>.tmp` in the target directory.
//! 2. `sync_all()` the tmp file.
//! 3. Rename over the final path (atomic on POSIX).
//! 4. fsync the parent directory so the rename itself survives a crash.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

/// Sibling tmp path used while writing `path`.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

/// Write `contents` to `path` so that readers see either the old or the new
/// file, never a torn one, and the new file is on disk when this returns.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("path has no parent directory"),
        ));
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = tmp_path_for(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }

    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), CoreError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| io_err(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), CoreError> {
    Ok(())
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_file_and_removes_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("proj.state");
        atomic_write(&path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!tmp_path_for(&path).exists(), "tmp file must be renamed away");
    }

    #[test]
    fn overwrite_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("entry");
        atomic_write(&path, b"v1").unwrap();
        atomic_write(&path, b"v2").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "v2");
    }

    #[test]
    #[cfg(unix)]
    fn failed_write_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let dir = root.path().join("readonly");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("proj.state");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&dir, perms).unwrap();

        let result = atomic_write(&path, b"new");

        let mut perms = fs::metadata(&dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&dir, perms).unwrap();

        // Permission bits are not enforced for root.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
            assert!(!tmp_path_for(&path).exists());
        }
    }
}
