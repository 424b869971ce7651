//! Size-based rotation of the scheduler log.
//!
//! `syncward.log` is rotated once it reaches 10 MiB, keeping five copies:
//! `syncward.log` → `syncward.log.1` → … → `syncward.log.5`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use syncward_core::Settings;

use crate::logging::reopen_active_log;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` when it is at least `max_bytes` long. Returns whether
/// a rotation happened; a missing log is not an error. Nothing is left at
/// `log_path` afterwards; the writer recreates it on reopen.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    match fs::metadata(log_path) {
        Ok(meta) if meta.len() >= max_bytes => {}
        Ok(_) => return Ok(false),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    }

    // `.max_files` falls off the end, every other copy moves up by one.
    for n in (1..=max_files).rev() {
        let copy = numbered_path(log_path, n);
        let moved = if n == max_files {
            fs::remove_file(&copy)
        } else {
            fs::rename(&copy, numbered_path(log_path, n + 1))
        };
        ignore_missing(moved)?;
    }
    if max_files == 0 {
        fs::remove_file(log_path)?;
    } else {
        fs::rename(log_path, numbered_path(log_path, 1))?;
    }
    Ok(true)
}

/// Rotate the configured log file and move this process's log writer onto
/// the fresh file. Failures are logged, never returned.
pub fn rotate_logs(settings: &Settings) {
    let log_path = settings.log_file();
    let rotated = rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES)
        .and_then(|rotated| {
            if rotated {
                reopen_active_log(&log_path)?;
            }
            Ok(rotated)
        });
    match rotated {
        Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed"),
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(syncward_core::settings::LOG_FILE);
    base.with_file_name(format!("{name}.{n}"))
}
