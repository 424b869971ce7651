use syncward_core::{ActionKind, Status};

use crate::action::Action;
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

/// Applies pending remote edits to the local store, then hands over to
/// [`CommitAction`](super::CommitAction).
#[derive(Debug, Clone, Copy, Default)]
pub struct EditAction;

impl Action for EditAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Edit
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Syncing
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::Commit
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        ctx.run(ActionKind::TransferRemoteToLocal, project)
    }
}
