//! Domain types for the sync pipeline.
//!
//! Project codes double as storage keys (state file names, queue entry
//! names), so [`ProjectCode::validate`] must pass before any of them touches
//! the filesystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of one synchronization project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectCode(pub String);

impl ProjectCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject codes that cannot safely name a file.
    pub fn validate(&self) -> Result<(), CoreError> {
        let code = self.0.as_str();
        let bad = code.is_empty()
            || code.starts_with('.')
            || code.contains(['/', '\\', '\0'])
            || code.ends_with(".tmp");
        if bad {
            return Err(CoreError::InvalidProjectCode(code.to_owned()));
        }
        Ok(())
    }
}

impl fmt::Display for ProjectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A named queue. `None` is the sentinel for "not independently queued".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStage {
    None,
    Edit,
    Synchronize,
}

impl QueueStage {
    /// Every real stage (the sentinel excluded).
    pub const REAL: [QueueStage; 2] = [QueueStage::Edit, QueueStage::Synchronize];

    /// Directory name of the stage's queue, `None` for the sentinel.
    pub fn dir_name(self) -> Option<&'static str> {
        match self {
            QueueStage::None => None,
            QueueStage::Edit => Some("edit"),
            QueueStage::Synchronize => Some("synchronize"),
        }
    }
}

impl fmt::Display for QueueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name().unwrap_or("none"))
    }
}

impl FromStr for QueueStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "edit" => Ok(QueueStage::Edit),
            "synchronize" | "sync" => Ok(QueueStage::Synchronize),
            other => Err(format!(
                "unknown queue stage '{other}'; expected: edit, synchronize"
            )),
        }
    }
}

/// One unit of pipeline work. Ordered; see [`crate::cycle`] for the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    EnsureClone,
    TransferRemoteToLocal,
    Commit,
    Synchronize,
    Edit,
    TransferLocalToRemote,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::EnsureClone => "ensure_clone",
            ActionKind::TransferRemoteToLocal => "transfer_remote_to_local",
            ActionKind::Commit => "commit",
            ActionKind::Synchronize => "synchronize",
            ActionKind::Edit => "edit",
            ActionKind::TransferLocalToRemote => "transfer_local_to_remote",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a project.
///
/// Persisted as the upper-case name. Older records stored the integer
/// position (`0 = CLONING` … `5 = ERROR`); both forms load, and anything
/// else is kept verbatim as [`Status::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Status {
    Cloning,
    Cloned,
    Syncing,
    #[default]
    Idle,
    Hold,
    Error,
    Unrecognized(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Cloning => "CLONING",
            Status::Cloned => "CLONED",
            Status::Syncing => "SYNCING",
            Status::Idle => "IDLE",
            Status::Hold => "HOLD",
            Status::Error => "ERROR",
            Status::Unrecognized(raw) => raw,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "CLONING" => Status::Cloning,
            "CLONED" => Status::Cloned,
            "SYNCING" => Status::Syncing,
            "IDLE" => Status::Idle,
            "HOLD" => Status::Hold,
            "ERROR" => Status::Error,
            other => Status::Unrecognized(other.to_owned()),
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Status::Cloning,
            1 => Status::Cloned,
            2 => Status::Syncing,
            3 => Status::Idle,
            4 => Status::Hold,
            5 => Status::Error,
            other => Status::Unrecognized(other.to_string()),
        }
    }

    /// Quiescent statuses never indicate mid-flight work.
    pub fn is_quiescent(&self) -> bool {
        matches!(
            self,
            Status::Cloned | Status::Idle | Status::Hold | Status::Error
        )
    }

    /// Statuses that can only survive a restart through a crash.
    pub fn is_transient(&self) -> bool {
        matches!(self, Status::Cloning | Status::Syncing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Name(String),
    Code(i64),
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StatusRepr::deserialize(deserializer)? {
            StatusRepr::Name(name) => Status::from_name(&name),
            StatusRepr::Code(code) => Status::from_code(code),
        })
    }
}

/// Machine-readable reason attached to an error or hold status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    NoError,
    Unspecified,
    EmptyProject,
    NoFlexProject,
    UnhandledException,
    Unauthorized,
    UnspecifiedBranchError,
    ProjectTooOld,
    ProjectTooNew,
}

impl ErrorCode {
    /// Numeric code exposed to operators.
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::Unspecified => 1,
            ErrorCode::EmptyProject => 10,
            ErrorCode::NoFlexProject => 11,
            ErrorCode::UnhandledException => 20,
            ErrorCode::Unauthorized => 30,
            ErrorCode::UnspecifiedBranchError => 50,
            ErrorCode::ProjectTooOld => 51,
            ErrorCode::ProjectTooNew => 52,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
