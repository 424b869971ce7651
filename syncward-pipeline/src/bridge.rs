//! The external version-control bridge and the tables that interpret its
//! output.
//!
//! The bridge reports outcomes as free text. The core never branches on
//! that text directly: every recognised fragment lives in one of the
//! sentinel tables below, and [`scan`] picks the first row (in table order)
//! that occurs anywhere in the output.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{io_err, ActionError};

/// Exit status a bridge command uses for refused credentials (`EX_NOPERM`).
pub const EXIT_UNAUTHORIZED: i32 = 77;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeOp {
    Clone,
    SendReceive,
}

impl BridgeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BridgeOp::Clone => "clone",
            BridgeOp::SendReceive => "send_receive",
        }
    }
}

impl fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named string options handed to the bridge.
pub type BridgeOptions = BTreeMap<String, String>;

/// What the bridge returned: whether it considers the call a success, and
/// its full text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutput {
    pub ok: bool,
    pub text: String,
}

/// Receives progress lines while a bridge call runs.
pub trait Progress {
    fn message(&self, line: &str);
}

/// Forwards progress lines to the log at `debug`.
pub struct LogProgress<'a> {
    pub project: &'a str,
}

impl Progress for LogProgress<'_> {
    fn message(&self, line: &str) {
        debug!(project = self.project, "{line}");
    }
}

pub trait RemoteSyncBridge: Send + Sync {
    fn execute(
        &self,
        op: BridgeOp,
        progress: &dyn Progress,
        options: &BridgeOptions,
    ) -> Result<BridgeOutput, ActionError>;
}

// ---------------------------------------------------------------------------
// Command-backed bridge
// ---------------------------------------------------------------------------

/// Runs `<command> <op> <options-json>` and returns stdout followed by
/// stderr. Exit status 0 is success; [`EXIT_UNAUTHORIZED`] is reported as
/// [`ActionError::Unauthorized`].
#[derive(Debug, Clone)]
pub struct CommandBridge {
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl CommandBridge {
    /// `command` is split on whitespace: the first word is the program,
    /// the rest are leading arguments.
    pub fn new(command: Option<&str>) -> Self {
        let mut words = command.unwrap_or_default().split_whitespace();
        Self {
            program: words.next().map(PathBuf::from),
            args: words.map(str::to_owned).collect(),
        }
    }
}

impl RemoteSyncBridge for CommandBridge {
    fn execute(
        &self,
        op: BridgeOp,
        progress: &dyn Progress,
        options: &BridgeOptions,
    ) -> Result<BridgeOutput, ActionError> {
        let program = self.program.as_ref().ok_or(ActionError::BridgeUnavailable)?;
        let options_json = serde_json::to_string(options)?;
        let output = Command::new(program)
            .args(&self.args)
            .arg(op.as_str())
            .arg(options_json)
            .output()
            .map_err(|e| io_err(program, e))?;

        if output.status.code() == Some(EXIT_UNAUTHORIZED) {
            return Err(ActionError::Unauthorized { op });
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        for line in text.lines() {
            progress.message(line);
        }
        Ok(BridgeOutput {
            ok: output.status.success(),
            text,
        })
    }
}

// ---------------------------------------------------------------------------
// Sentinel tables
// ---------------------------------------------------------------------------

/// One recognised output fragment and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel<K> {
    pub needle: &'static str,
    pub kind: K,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelMatch<'a, K> {
    Match {
        kind: K,
        needle: &'static str,
        line: &'a str,
    },
    NoMatch,
}

/// Outcomes of a clone call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// Unusable remote; the project goes on hold.
    Hold,
    /// Remote lacks our model branch; inspect the highest model it offers.
    NoSuchBranch,
    CloneCreated,
    TransientNetwork,
}

/// Outcomes of a send/receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The branch carries another model version (follows the needle).
    ModelVersionBranch,
    /// Remote has a newer model (follows the needle); migrate and retry.
    AllowMigration,
    Hold,
    /// Logged, nothing else.
    LogOnly,
    TransientNetwork,
    NoChanges,
    ReceivedChanges,
}

pub const TEMPORARY_NETWORK_FAILURE: &str = "Temporary failure in name resolution";
pub const HIGHEST_AVAILABLE_MODEL: &str = "Highest available model '";
pub const CANNOT_COMMIT_CURRENT_BRANCH: &str = "Cannot commit to current branch '";
pub const PULLED_HIGHER_MODEL: &str = "pulled a higher model '";

pub const CLONE_SENTINELS: &[Sentinel<CloneOutcome>] = &[
    Sentinel { needle: "clone is not a FLEx project", kind: CloneOutcome::Hold },
    Sentinel { needle: "new repository with no commits", kind: CloneOutcome::Hold },
    Sentinel { needle: "clone has higher model", kind: CloneOutcome::Hold },
    Sentinel {
        needle: "LfMergeBridge starting S/R handler from directory",
        kind: CloneOutcome::Hold,
    },
    Sentinel { needle: "no such branch", kind: CloneOutcome::NoSuchBranch },
    Sentinel { needle: "new clone created on branch", kind: CloneOutcome::CloneCreated },
    Sentinel { needle: TEMPORARY_NETWORK_FAILURE, kind: CloneOutcome::TransientNetwork },
];

pub const SYNC_SENTINELS: &[Sentinel<SyncOutcome>] = &[
    Sentinel { needle: CANNOT_COMMIT_CURRENT_BRANCH, kind: SyncOutcome::ModelVersionBranch },
    Sentinel { needle: PULLED_HIGHER_MODEL, kind: SyncOutcome::AllowMigration },
    Sentinel {
        needle: "Cannot create a repository at this point in LF development.",
        kind: SyncOutcome::Hold,
    },
    Sentinel { needle: "Cannot do first commit.", kind: SyncOutcome::Hold },
    Sentinel { needle: "Sync failure:", kind: SyncOutcome::LogOnly },
    Sentinel { needle: TEMPORARY_NETWORK_FAILURE, kind: SyncOutcome::TransientNetwork },
    Sentinel { needle: "No changes from others", kind: SyncOutcome::NoChanges },
    Sentinel { needle: "Received changes from others", kind: SyncOutcome::ReceivedChanges },
];

/// First row of `table` whose needle occurs in some line of `output`,
/// together with that line.
pub fn scan<'a, K: Copy>(output: &'a str, table: &[Sentinel<K>]) -> SentinelMatch<'a, K> {
    for row in table {
        if let Some(line) = output.lines().find(|line| line.contains(row.needle)) {
            return SentinelMatch::Match {
                kind: row.kind,
                needle: row.needle,
                line,
            };
        }
    }
    SentinelMatch::NoMatch
}

/// Model versions are seven digits.
pub const MODEL_VERSION_DIGITS: usize = 7;

/// Parse the model version that immediately follows `needle` in `line`.
pub fn model_version_after(line: &str, needle: &str) -> Option<u32> {
    let start = line.find(needle)? + needle.len();
    let digits: String = line[start..].chars().take(MODEL_VERSION_DIGITS).collect();
    if digits.len() != MODEL_VERSION_DIGITS {
        return None;
    }
    digits.parse().ok()
}
