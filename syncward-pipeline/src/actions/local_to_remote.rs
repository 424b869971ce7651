use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, warn};

use syncward_core::{ActionKind, ConversionError, ErrorReport, Record, Status};

use crate::action::Action;
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

use super::open_local_or_skip;

/// Publishes the local store to the remote document store and stamps the
/// last-synced date, even when some items were skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferLocalToRemoteAction;

impl Action for TransferLocalToRemoteAction {
    fn kind(&self) -> ActionKind {
        ActionKind::TransferLocalToRemote
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Syncing
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        let Some(store) = open_local_or_skip(project, ctx)? else {
            return Ok(());
        };
        let code = project.code().clone();
        let documents = ctx.documents();
        let local = store.records();
        let comments = store.comments();
        store.close()?;

        let mut errors: ConversionError<Record> = ConversionError::new();
        let keep: HashSet<_> = local.iter().map(|r| r.guid).collect();
        for record in local {
            if let Err(err) = documents.upsert(&code, &record) {
                errors.add_entry_error(record, err);
            }
        }
        for comment in comments {
            if let Err(err) = documents.upsert_comment(&code, &comment) {
                errors.add_comment_error(comment, err, None);
            }
        }
        // Records deleted locally (or marked deleted remotely) go away.
        for remote in documents.records(&code)? {
            if keep.contains(&remote.guid) {
                continue;
            }
            if let Err(err) = documents.delete(&code, remote.guid) {
                errors.add_entry_error(remote, err);
            }
        }

        if errors.any() {
            warn!(
                project = %code,
                entries = errors.entry_error_count(),
                comments = errors.comment_error_count(),
                initial_clone = project.is_initial_clone,
                "partial transfer to remote store"
            );
            let report = ErrorReport::from_remote_conversion(errors.create_reports());
            project.state.report_errors(report)?;
        }

        debug!(project = %code, "setting last-synced date");
        documents.set_last_synced_date(&code, Utc::now())?;
        Ok(())
    }
}
