use tracing::{debug, warn};

use syncward_core::{ActionKind, ConversionError, ErrorReport, Record, Status};

use crate::action::Action;
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

use super::open_local_or_skip;

/// Pulls every record and comment of the remote document store into the
/// local store. Items that fail are collected into one report; they never
/// fail the action.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferRemoteToLocalAction;

impl Action for TransferRemoteToLocalAction {
    fn kind(&self) -> ActionKind {
        ActionKind::TransferRemoteToLocal
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Syncing
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        project.entry_counts.reset();
        let Some(mut store) = open_local_or_skip(project, ctx)? else {
            return Ok(());
        };

        let code = project.code().clone();
        let mut errors: ConversionError<Record> = ConversionError::new();
        for record in ctx.documents().records(&code)? {
            match store.apply(&record) {
                Ok(change) => change.tally(&mut project.entry_counts),
                Err(err) => errors.add_entry_error(record, err),
            }
        }
        for comment in ctx.documents().comments(&code)? {
            if let Err(err) = store.apply_comment(&comment) {
                match comment.entry_guid {
                    Some(guid) => errors.add_comment_error_for_guid(comment, err, guid),
                    None => errors.add_comment_error(comment, err, None),
                }
            }
        }
        store.close()?;

        let counts = project.entry_counts;
        project
            .state
            .update(|s| s.uncommitted_edit_counter += counts.total() as u32)?;
        debug!(
            project = %code,
            added = counts.added,
            modified = counts.modified,
            deleted = counts.deleted,
            "remote records applied"
        );

        if errors.any() {
            warn!(
                project = %code,
                entries = errors.entry_error_count(),
                comments = errors.comment_error_count(),
                "partial transfer to local store"
            );
            let report = ErrorReport::from_local_conversion(errors.create_reports());
            project.state.report_errors(report)?;
        }
        Ok(())
    }
}
