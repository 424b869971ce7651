use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduler, janitor and watch loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] syncward_core::CoreError),

    #[error(transparent)]
    Queue(#[from] syncward_queue::QueueError),

    #[error(transparent)]
    Action(#[from] syncward_pipeline::ActionError),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("host lock {path} is held by another process")]
    LockHeld { path: PathBuf },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
