//! The [`Action`] trait, the run contract shared by every action, and the
//! kind → action dispatch table.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use syncward_core::{ActionKind, Status};

use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Status recorded when the action starts.
    fn status_for_action(&self, project: &SyncProject) -> Status;

    /// Successor on success; [`ActionKind::None`] ends the chain.
    fn next_action_kind(&self) -> ActionKind;

    fn pre_run(&self, _project: &mut SyncProject, _ctx: &SyncContext) -> Result<(), ActionError> {
        Ok(())
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError>;
}

/// Run `action` on `project`.
///
/// A project on HOLD is left untouched and `do_run` is not called. When
/// `do_run` fails the status is demoted (CLONING during an initial clone,
/// else IDLE unless already HOLD or ERROR), the crash reporter is told and
/// the error is returned.
pub fn run_action(
    action: &dyn Action,
    project: &mut SyncProject,
    ctx: &SyncContext,
) -> Result<(), ActionError> {
    let kind = action.kind();
    info!(project = %project.code(), action = %kind, "action starting");

    action.pre_run(project, ctx)?;

    if *project.status() == Status::Hold {
        info!(project = %project.code(), action = %kind, "project on hold, skipping");
        return Ok(());
    }

    let status = action.status_for_action(project);
    project.state.set_status(status)?;

    if let Err(err) = action.do_run(project, ctx) {
        let demoted = if project.is_initial_clone {
            Some(Status::Cloning)
        } else if matches!(project.status(), Status::Hold | Status::Error) {
            None
        } else {
            Some(Status::Idle)
        };
        if let Some(status) = demoted {
            if let Err(persist) = project.state.set_status(status) {
                warn!(project = %project.code(), error = %persist, "could not record failed status");
            }
        }
        error!(
            project = %project.code(),
            action = %kind,
            status = %project.status(),
            error = %err,
            "action failed"
        );
        ctx.crash_reporter().notify(&err);
        return Err(err);
    }

    debug!(project = %project.code(), action = %kind, status = %project.status(), "action finished");
    Ok(())
}

/// Every action, built once and looked up by kind.
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Box<dyn Action>>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// The seven standard actions.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(crate::actions::NoneAction));
        registry.register(Box::new(crate::actions::EnsureCloneAction));
        registry.register(Box::new(crate::actions::TransferRemoteToLocalAction));
        registry.register(Box::new(crate::actions::CommitAction));
        registry.register(Box::new(crate::actions::SynchronizeAction));
        registry.register(Box::new(crate::actions::EditAction));
        registry.register(Box::new(crate::actions::TransferLocalToRemoteAction));
        registry
    }

    /// Add `action`, replacing any action of the same kind.
    pub fn register(&mut self, action: Box<dyn Action>) {
        self.actions.insert(action.kind(), action);
    }

    pub fn get(&self, kind: ActionKind) -> Result<&dyn Action, ActionError> {
        self.actions
            .get(&kind)
            .map(|action| action.as_ref())
            .ok_or(ActionError::NotRegistered(kind))
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
