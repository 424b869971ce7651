//! Error types for syncward-pipeline.

use std::path::PathBuf;

use thiserror::Error;

use syncward_core::{ActionKind, CoreError};
use syncward_queue::QueueError;

use crate::bridge::BridgeOp;

#[derive(Debug, Error)]
pub enum ActionError {
    /// State or settings persistence failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The bridge process could not be run at all.
    #[error("bridge {op} failed to run: {message}")]
    Bridge { op: BridgeOp, message: String },

    #[error("no bridge command configured; set bridge_command or SYNCWARD_BRIDGE_COMMAND")]
    BridgeUnavailable,

    /// The remote repository refused our credentials.
    #[error("bridge {op}: authorization refused by remote repository")]
    Unauthorized { op: BridgeOp },

    /// Name resolution or similar failure expected to clear on its own.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The bridge ran but reported that the clone did not complete.
    #[error("bridge clone failed: {0}")]
    CloneFailed(String),

    /// Bridge output matched none of the outcomes we know how to handle.
    #[error("bridge {op}: unexpected output: {detail}")]
    UnexpectedOutput { op: BridgeOp, detail: String },

    /// A store-wide failure (as opposed to a single item failing).
    #[error("store error: {0}")]
    Store(String),

    /// One record or comment could not be converted.
    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no action registered for '{0}'")]
    NotRegistered(ActionKind),
}

impl ActionError {
    /// Whether the same work should simply be attempted again next sweep.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::TransientNetwork(_) | ActionError::CloneFailed(_)
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ActionError {
    ActionError::Io {
        path: path.into(),
        source,
    }
}
