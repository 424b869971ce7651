//! One stage's queue.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use syncward_core::fs::atomic_write;
use syncward_core::{ProjectCode, QueueStage, Settings};

use crate::error::{io_err, QueueError};

/// Body of one queue entry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub project: ProjectCode,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Queue {
    stage: QueueStage,
    dir: PathBuf,
}

impl Queue {
    /// The queue for `stage` under the settings' layout.
    pub fn new(stage: QueueStage, settings: &Settings) -> Result<Self, QueueError> {
        let dir = settings
            .queue_dir(stage)
            .ok_or(QueueError::InvalidStage(stage))?;
        Ok(Self { stage, dir })
    }

    /// The queue for `stage` stored directly in `dir`.
    pub fn at(stage: QueueStage, dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        if stage == QueueStage::None {
            return Err(QueueError::InvalidStage(stage));
        }
        Ok(Self {
            stage,
            dir: dir.into(),
        })
    }

    pub fn stage(&self) -> QueueStage {
        self.stage
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, code: &ProjectCode) -> PathBuf {
        self.dir.join(code.as_str())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.entries()?.is_empty())
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.entries()?.len())
    }

    pub fn contains(&self, code: &ProjectCode) -> bool {
        self.entry_path(code).is_file()
    }

    /// All pending entries, oldest first (ties broken by project code).
    pub fn entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let read = match std::fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir, e)),
        };
        let mut entries = Vec::new();
        for item in read {
            let item = item.map_err(|e| io_err(&self.dir, e))?;
            let path = item.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let code = ProjectCode::from(name);
            if code.validate().is_err() {
                continue;
            }
            entries.push(self.read_entry(&path, code)?);
        }
        entries.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.project.cmp(&b.project))
        });
        Ok(entries)
    }

    fn read_entry(&self, path: &Path, code: ProjectCode) -> Result<QueueEntry, QueueError> {
        let body = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        if let Ok(entry) = serde_json::from_str::<QueueEntry>(&body) {
            if entry.project == code {
                return Ok(entry);
            }
        }
        // Hand-made entries (`touch queues/edit/CODE`) order by mtime.
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(path, e))?;
        if !body.trim().is_empty() {
            warn!(stage = %self.stage, project = %code, "unparsable queue entry, ordering by mtime");
        }
        Ok(QueueEntry {
            project: code,
            enqueued_at: DateTime::<Utc>::from(modified),
        })
    }

    /// Pending projects oldest first. When `priority` is pending it comes
    /// first, followed by the entries after it, wrapping round to the ones
    /// before it.
    pub fn queued_projects(
        &self,
        priority: Option<&ProjectCode>,
    ) -> Result<Vec<ProjectCode>, QueueError> {
        let mut codes: Vec<ProjectCode> =
            self.entries()?.into_iter().map(|e| e.project).collect();
        if let Some(priority) = priority {
            if let Some(idx) = codes.iter().position(|c| c == priority) {
                codes.rotate_left(idx);
            }
        }
        Ok(codes)
    }

    /// Add `code` unless it is already pending. Returns whether an entry
    /// was written.
    pub fn enqueue(&self, code: &ProjectCode) -> Result<bool, QueueError> {
        let newest = self.entries()?.iter().map(|e| e.enqueued_at).max();
        let now = Utc::now();
        // Keep arrival order strict even within one clock tick.
        let at = match newest {
            Some(newest) if newest >= now => newest + Duration::microseconds(1),
            _ => now,
        };
        self.enqueue_at(code, at)
    }

    /// [`Queue::enqueue`] with an explicit arrival time.
    pub fn enqueue_at(&self, code: &ProjectCode, at: DateTime<Utc>) -> Result<bool, QueueError> {
        code.validate()?;
        if self.contains(code) {
            debug!(stage = %self.stage, project = %code, "already queued");
            return Ok(false);
        }
        let entry = QueueEntry {
            project: code.clone(),
            enqueued_at: at,
        };
        let body = serde_json::to_vec(&entry)?;
        atomic_write(&self.entry_path(code), &body)?;
        debug!(stage = %self.stage, project = %code, "enqueued");
        Ok(true)
    }

    /// Remove `code`. Absent entries are not an error. Returns whether an
    /// entry was removed.
    pub fn dequeue(&self, code: &ProjectCode) -> Result<bool, QueueError> {
        code.validate()?;
        let path = self.entry_path(code);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(stage = %self.stage, project = %code, "dequeued");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Remove temp files left by an interrupted enqueue.
    pub fn sweep_temp_files(&self) -> Result<usize, QueueError> {
        let read = match std::fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&self.dir, e)),
        };
        let mut removed = 0;
        for item in read {
            let path = item.map_err(|e| io_err(&self.dir, e))?.path();
            let is_tmp = path.extension().and_then(|e| e.to_str()) == Some("tmp");
            if is_tmp && path.is_file() {
                std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
