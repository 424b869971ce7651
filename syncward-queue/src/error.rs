//! Error types for syncward-queue.

use std::path::PathBuf;

use thiserror::Error;

use syncward_core::{CoreError, QueueStage};

#[derive(Debug, Error)]
pub enum QueueError {
    /// A queue was requested for a stage that has no queue.
    #[error("stage '{0}' has no queue")]
    InvalidStage(QueueStage),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("queue entry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.into(),
        source,
    }
}
