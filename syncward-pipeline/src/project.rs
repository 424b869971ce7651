//! The project being worked on during one scheduler turn.

use std::path::PathBuf;

use syncward_core::{EntryCounts, ProjectCode, Settings, Status, TrackedState};

/// A project's durable state plus scratch data shared by the actions of
/// one turn. Dropped at the end of the turn.
#[derive(Debug)]
pub struct SyncProject {
    pub state: TrackedState,
    /// Local clone directory.
    pub dir: PathBuf,
    pub entry_counts: EntryCounts,
    /// Model version the bridge reported for this project, if any.
    pub model_version: Option<u32>,
    /// Set while the first transfer after a fresh clone runs.
    pub is_initial_clone: bool,
    /// Operator request to treat the next clone as initial even when the
    /// remote store already has data.
    pub treat_as_initial_clone: bool,
    pub allow_data_migration: bool,
    /// The bridge produced a clone during this turn, so the local store may
    /// not exist yet and opening it starts an empty one.
    pub cloned_this_turn: bool,
}

impl SyncProject {
    pub fn new(state: TrackedState, settings: &Settings) -> Self {
        let dir = settings.project_dir(state.code());
        Self {
            state,
            dir,
            entry_counts: EntryCounts::default(),
            model_version: None,
            is_initial_clone: false,
            treat_as_initial_clone: false,
            allow_data_migration: false,
            cloned_this_turn: false,
        }
    }

    pub fn code(&self) -> &ProjectCode {
        self.state.code()
    }

    pub fn status(&self) -> &Status {
        self.state.status()
    }

    /// The reported model version, else `fallback`.
    pub fn model_version_or(&self, fallback: u32) -> u32 {
        self.model_version.unwrap_or(fallback)
    }
}
