use tracing::info;

use syncward_core::{ActionKind, Status};

use crate::action::Action;
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

use super::open_local_or_skip;

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitAction;

impl Action for CommitAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Commit
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Syncing
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::Synchronize
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        let Some(mut store) = open_local_or_skip(project, ctx)? else {
            return Ok(());
        };
        let message = project.entry_counts.commit_message();
        store.commit(&message)?;
        store.close()?;
        info!(project = %project.code(), message = %message, "committed local store");
        project
            .state
            .update(|s| s.uncommitted_edit_counter = 0)?;
        Ok(())
    }
}
