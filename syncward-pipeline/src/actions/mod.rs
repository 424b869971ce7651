//! The concrete actions, one per [`ActionKind`](syncward_core::ActionKind).

mod commit;
mod edit;
mod ensure_clone;
mod local_to_remote;
mod none;
mod remote_to_local;
mod synchronize;

pub use commit::CommitAction;
pub use edit::EditAction;
pub use ensure_clone::EnsureCloneAction;
pub use local_to_remote::TransferLocalToRemoteAction;
pub use none::NoneAction;
pub use remote_to_local::TransferRemoteToLocalAction;
pub use synchronize::SynchronizeAction;

use tracing::warn;

use syncward_core::ErrorCode;

use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;
use crate::store::{DomainStore, OpenOutcome};

/// Open the project's local store. Expected refusals are logged (an
/// incompatible store also puts the project on hold) and yield `None`.
pub(crate) fn open_local_or_skip(
    project: &mut SyncProject,
    ctx: &SyncContext,
) -> Result<Option<Box<dyn DomainStore>>, ActionError> {
    match ctx.open_local(project)? {
        OpenOutcome::Opened(store) => Ok(Some(store)),
        OpenOutcome::NoSuchProject => {
            warn!(project = %project.code(), dir = %project.dir.display(), "no local store for project");
            Ok(None)
        }
        OpenOutcome::Locked => {
            warn!(project = %project.code(), "local store is locked by another process");
            Ok(None)
        }
        OpenOutcome::IncompatibleVersion { found, supported } => {
            let code = if found > supported {
                ErrorCode::ProjectTooNew
            } else {
                ErrorCode::ProjectTooOld
            };
            let reason = format!(
                "Local store of {} has model version {found}; this host supports {supported}",
                project.code()
            );
            project.state.put_on_hold_with(code, &reason)?;
            Ok(None)
        }
    }
}
