//! The explicit context every action runs against.

use syncward_core::{ActionKind, ProjectCode, Settings, StateStore};
use syncward_queue::QueueSet;

use crate::action::{run_action, ActionRegistry};
use crate::bridge::{CommandBridge, RemoteSyncBridge};
use crate::crash::{CrashReporter, LogCrashReporter};
use crate::error::ActionError;
use crate::project::SyncProject;
use crate::store::{
    DocumentStoreConnector, DomainStoreConnector, FileDocumentStore, FileDomainConnector,
    OpenOutcome, OpenRequest,
};

/// External systems the pipeline talks to.
pub struct Collaborators {
    pub bridge: Box<dyn RemoteSyncBridge>,
    pub domain: Box<dyn DomainStoreConnector>,
    pub documents: Box<dyn DocumentStoreConnector>,
    pub crash_reporter: Box<dyn CrashReporter>,
}

impl Collaborators {
    /// Command bridge plus file-backed stores under the settings' layout.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bridge: Box::new(CommandBridge::new(settings.bridge_command.as_deref())),
            domain: Box::new(FileDomainConnector),
            documents: Box::new(FileDocumentStore::new(settings.documents_dir())),
            crash_reporter: Box::new(LogCrashReporter),
        }
    }
}

pub struct SyncContext {
    settings: Settings,
    queues: QueueSet,
    states: StateStore,
    collaborators: Collaborators,
    actions: ActionRegistry,
}

impl SyncContext {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Result<Self, ActionError> {
        let queues = QueueSet::new(&settings)?;
        let states = StateStore::new(&settings);
        Ok(Self {
            settings,
            queues,
            states,
            collaborators,
            actions: ActionRegistry::standard(),
        })
    }

    /// Replace the dispatch table.
    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    pub fn bridge(&self) -> &dyn RemoteSyncBridge {
        self.collaborators.bridge.as_ref()
    }

    pub fn domain(&self) -> &dyn DomainStoreConnector {
        self.collaborators.domain.as_ref()
    }

    pub fn documents(&self) -> &dyn DocumentStoreConnector {
        self.collaborators.documents.as_ref()
    }

    pub fn crash_reporter(&self) -> &dyn CrashReporter {
        self.collaborators.crash_reporter.as_ref()
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Load `code`'s state and start a turn for it.
    pub fn open_project(&self, code: &ProjectCode) -> Result<SyncProject, ActionError> {
        let state = self.states.open(code)?;
        Ok(SyncProject::new(state, &self.settings))
    }

    /// Run the action registered for `kind` under the run contract.
    pub fn run(&self, kind: ActionKind, project: &mut SyncProject) -> Result<(), ActionError> {
        let action = self.actions.get(kind)?;
        run_action(action, project, self)
    }

    /// Open `project`'s local store with its current model version.
    pub fn open_local(&self, project: &SyncProject) -> Result<OpenOutcome, ActionError> {
        let request = OpenRequest {
            code: project.code(),
            dir: &project.dir,
            model_version: project.model_version_or(self.settings.default_model_version),
            allow_data_migration: project.allow_data_migration,
            create_if_missing: project.cloned_this_turn,
        };
        self.domain().open(&request)
    }
}
