//! Error types for syncward-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from state, settings and report persistence.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (state records, reports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings YAML parse error with the file path.
    #[error("failed to parse settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (writing default settings).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A project code that cannot be used as a storage key.
    #[error("invalid project code '{0}'")]
    InvalidProjectCode(String),

    /// `dirs::home_dir()` returned `None` and no base dir was configured.
    #[error("cannot determine home directory; set $HOME or SYNCWARD_BASE_DIR")]
    HomeNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
