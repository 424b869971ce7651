//! Persisted per-project processing state.
//!
//! One JSON record per project lives at `state/<code>.state`. Every
//! mutation made through [`TrackedState`] is written to disk (atomically,
//! fsynced) before the mutating call returns, so the recovery pass at the
//! next startup always sees the last status an action set.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{io_err, CoreError};
use crate::fs::atomic_write;
use crate::reporting::ErrorReport;
use crate::settings::Settings;
use crate::types::{ErrorCode, ProjectCode, Status};

pub const STATE_EXTENSION: &str = "state";

/// Fallback hold reason when the caller supplies none.
pub const UNSPECIFIED_HOLD_REASON: &str = "Project going on hold due to unspecified error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingState {
    pub project_code: ProjectCode,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub error_code: ErrorCode,
    pub created_at: DateTime<Utc>,
    pub last_state_change: DateTime<Utc>,
    pub retry_counter: u32,
    pub uncommitted_edit_counter: u32,
    pub previous_run_total_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_report: Option<ErrorReport>,
}

impl Default for ProcessingState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            project_code: ProjectCode(String::new()),
            status: Status::default(),
            error_message: None,
            error_code: ErrorCode::NoError,
            created_at: now,
            last_state_change: now,
            retry_counter: 0,
            uncommitted_edit_counter: 0,
            previous_run_total_ms: 0,
            last_error_report: None,
        }
    }
}

impl ProcessingState {
    /// The quiescent record of a project that has never been processed.
    pub fn new(code: ProjectCode) -> Self {
        Self {
            project_code: code,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record; an unparsable body yields `None`.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Directory-backed collection of [`ProcessingState`] records.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    reports_dir: PathBuf,
}

impl StateStore {
    pub fn new(settings: &Settings) -> Self {
        Self::at(settings.state_dir(), settings.reports_dir())
    }

    pub fn at(dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, code: &ProjectCode) -> PathBuf {
        self.dir.join(format!("{}.{STATE_EXTENSION}", code.0))
    }

    /// Whether a record was ever persisted for `code`.
    pub fn exists(&self, code: &ProjectCode) -> bool {
        self.path_for(code).is_file()
    }

    /// Load the record for `code`.
    ///
    /// A missing file or a body that does not parse yields the default
    /// quiescent record; only a failed read of an existing file is an error.
    pub fn load(&self, code: &ProjectCode) -> Result<ProcessingState, CoreError> {
        code.validate()?;
        let path = self.path_for(code);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(project = %code, "no state record, using default");
                return Ok(ProcessingState::new(code.clone()));
            }
            Err(e) => return Err(io_err(path, e)),
        };
        match ProcessingState::from_json(&contents) {
            Some(mut state) => {
                if state.project_code != *code {
                    state.project_code = code.clone();
                }
                Ok(state)
            }
            None => {
                warn!(project = %code, path = %path.display(), "unreadable state record, using default");
                Ok(ProcessingState::new(code.clone()))
            }
        }
    }

    pub fn save(&self, state: &ProcessingState) -> Result<(), CoreError> {
        state.project_code.validate()?;
        let json = state.to_json()?;
        atomic_write(&self.path_for(&state.project_code), json.as_bytes())
    }

    /// Project codes with a persisted record, sorted.
    pub fn codes(&self) -> Result<Vec<ProjectCode>, CoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir, e)),
        };
        let mut codes = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                codes.push(ProjectCode::from(stem));
            }
        }
        codes.sort();
        Ok(codes)
    }

    /// Every persisted record, sorted by project code.
    pub fn list(&self) -> Result<Vec<ProcessingState>, CoreError> {
        self.codes()?.iter().map(|code| self.load(code)).collect()
    }

    /// Load `code` and wrap it so every mutation persists.
    pub fn open(&self, code: &ProjectCode) -> Result<TrackedState, CoreError> {
        Ok(TrackedState {
            state: self.load(code)?,
            store: self.clone(),
        })
    }

    /// Write `report` to `reports/<code>-<timestamp>.json`.
    pub fn write_report(
        &self,
        code: &ProjectCode,
        report: &ErrorReport,
    ) -> Result<PathBuf, CoreError> {
        let stamp = report.timestamp.format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.reports_dir.join(format!("{}-{stamp}.json", code.0));
        let json = serde_json::to_string_pretty(report)?;
        atomic_write(&path, json.as_bytes())?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tracked state
// ---------------------------------------------------------------------------

/// A loaded record bound to its store. Mutators persist before returning.
#[derive(Debug, Clone)]
pub struct TrackedState {
    state: ProcessingState,
    store: StateStore,
}

impl TrackedState {
    pub fn code(&self) -> &ProjectCode {
        &self.state.project_code
    }

    pub fn status(&self) -> &Status {
        &self.state.status
    }

    pub fn record(&self) -> &ProcessingState {
        &self.state
    }

    pub fn set_status(&mut self, status: Status) -> Result<(), CoreError> {
        self.update(|s| s.status = status)
    }

    /// Set status, code and message in one persisted write.
    pub fn set_error_state(
        &mut self,
        status: Status,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        let message = message.into();
        self.update(|s| {
            s.status = status;
            s.error_code = code;
            s.error_message = Some(message);
        })
    }

    pub fn put_on_hold(&mut self, reason: &str) -> Result<(), CoreError> {
        self.put_on_hold_with(ErrorCode::Unspecified, reason)
    }

    pub fn put_on_hold_with(&mut self, code: ErrorCode, reason: &str) -> Result<(), CoreError> {
        let reason = if reason.trim().is_empty() {
            UNSPECIFIED_HOLD_REASON
        } else {
            reason
        };
        warn!(project = %self.code(), reason, "putting project on hold");
        self.set_error_state(Status::Hold, code, reason)
    }

    /// Leave HOLD (or ERROR) for IDLE and forget the error.
    pub fn clear_hold(&mut self) -> Result<(), CoreError> {
        self.update(|s| {
            s.status = Status::Idle;
            s.error_code = ErrorCode::NoError;
            s.error_message = None;
        })
    }

    /// Attach `report` to the record and write the operator copy.
    /// The status is left as is.
    pub fn report_errors(&mut self, report: ErrorReport) -> Result<PathBuf, CoreError> {
        let path = self.store.write_report(&self.state.project_code, &report)?;
        self.update(|s| s.last_error_report = Some(report))?;
        Ok(path)
    }

    /// Apply `f` and persist. `last_state_change` is bumped.
    pub fn update(&mut self, f: impl FnOnce(&mut ProcessingState)) -> Result<(), CoreError> {
        f(&mut self.state);
        self.state.last_state_change = Utc::now();
        self.save()
    }

    pub fn save(&self) -> Result<(), CoreError> {
        self.store.save(&self.state)
    }

    /// Re-read the record from disk, discarding in-memory changes.
    pub fn reload(&mut self) -> Result<(), CoreError> {
        self.state = self.store.load(&self.state.project_code)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> StateStore {
        StateStore::at(tmp.path().join("state"), tmp.path().join("reports"))
    }

    #[test]
    fn unseen_project_is_idle_default() {
        let tmp = TempDir::new().unwrap();
        let state = store(&tmp).load(&ProjectCode::from("fresh")).unwrap();
        assert_eq!(state.status, Status::Idle);
        assert_eq!(state.project_code, ProjectCode::from("fresh"));
        assert!(!store(&tmp).exists(&ProjectCode::from("fresh")));
    }

    #[test]
    fn corrupt_record_loads_as_default() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let code = ProjectCode::from("broken");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.path_for(&code), "{ not json").unwrap();
        assert_eq!(store.load(&code).unwrap().status, Status::Idle);
    }

    #[test]
    fn integer_status_from_older_records() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let code = ProjectCode::from("legacy");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(
            store.path_for(&code),
            r#"{"project_code":"legacy","status":2}"#,
        )
        .unwrap();
        assert_eq!(store.load(&code).unwrap().status, Status::Syncing);
    }

    #[test]
    fn set_status_persists_immediately() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let code = ProjectCode::from("proja");
        let mut tracked = store.open(&code).unwrap();
        tracked.set_status(Status::Syncing).unwrap();
        assert_eq!(store.load(&code).unwrap().status, Status::Syncing);
    }

    #[test]
    fn unrecognized_status_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut state = ProcessingState::new(ProjectCode::from("odd"));
        state.status = Status::Unrecognized("PAUSED".into());
        store.save(&state).unwrap();
        assert_eq!(
            store.load(&state.project_code).unwrap().status,
            Status::Unrecognized("PAUSED".into())
        );
    }

    #[test]
    fn hold_with_blank_reason_uses_fallback() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut tracked = store.open(&ProjectCode::from("held")).unwrap();
        tracked.put_on_hold("  ").unwrap();
        let record = store.load(tracked.code()).unwrap();
        assert_eq!(record.status, Status::Hold);
        assert_eq!(record.error_code, ErrorCode::Unspecified);
        assert_eq!(record.error_message.as_deref(), Some(UNSPECIFIED_HOLD_REASON));

        tracked.clear_hold().unwrap();
        let record = store.load(tracked.code()).unwrap();
        assert_eq!(record.status, Status::Idle);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn report_errors_keeps_status_and_writes_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut tracked = store.open(&ProjectCode::from("partial")).unwrap();
        tracked.set_status(Status::Syncing).unwrap();

        let path = tracked
            .report_errors(ErrorReport::new().with_exception("two entries failed"))
            .unwrap();
        assert!(path.starts_with(tmp.path().join("reports")));

        let record = store.load(tracked.code()).unwrap();
        assert_eq!(record.status, Status::Syncing);
        assert_eq!(
            record.last_error_report.unwrap().exception_message.as_deref(),
            Some("two entries failed")
        );
    }

    #[test]
    fn list_is_sorted_and_skips_other_files() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for code in ["zeta", "alpha"] {
            store.save(&ProcessingState::new(ProjectCode::from(code))).unwrap();
        }
        std::fs::write(store.dir().join("notes.txt"), "x").unwrap();
        let codes: Vec<_> = store.list().unwrap().into_iter().map(|s| s.project_code).collect();
        assert_eq!(codes, vec![ProjectCode::from("alpha"), ProjectCode::from("zeta")]);
    }

    #[test]
    fn invalid_code_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).load(&ProjectCode::from("../etc")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidProjectCode(_)));
    }
}
