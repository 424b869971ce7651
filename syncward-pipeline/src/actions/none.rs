use syncward_core::{ActionKind, Status};

use crate::action::Action;
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

/// Terminator of every chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneAction;

impl Action for NoneAction {
    fn kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Idle
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn do_run(&self, _project: &mut SyncProject, _ctx: &SyncContext) -> Result<(), ActionError> {
        Ok(())
    }
}
