//! Makes sure a local clone exists before any queued work runs.
//!
//! This action has no queue of its own: the scheduler runs it ahead of the
//! dequeued action on every turn. It only does work when the project was
//! never processed, is still marked CLONING, or has lost its local store.

use tracing::{debug, error, info, warn};

use syncward_core::{ActionKind, ErrorCode, Status};

use crate::action::Action;
use crate::bridge::{
    model_version_after, scan, BridgeOp, BridgeOptions, CloneOutcome, LogProgress,
    SentinelMatch, CLONE_SENTINELS, HIGHEST_AVAILABLE_MODEL,
};
use crate::context::SyncContext;
use crate::error::{io_err, ActionError};
use crate::project::SyncProject;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureCloneAction;

impl EnsureCloneAction {
    fn hold(project: &mut SyncProject, code: ErrorCode, line: &str) -> Result<(), ActionError> {
        let reason = format!("Error during initial clone of {}: {line}", project.code());
        error!(project = %project.code(), "{reason}");
        project.state.put_on_hold_with(code, &reason)?;
        Ok(())
    }

    fn remove_clone_dir(project: &SyncProject) -> Result<(), ActionError> {
        if project.dir.is_dir() {
            std::fs::remove_dir_all(&project.dir).map_err(|e| io_err(&project.dir, e))?;
        }
        Ok(())
    }

    fn clone_options(project: &SyncProject, ctx: &SyncContext, repair: bool) -> BridgeOptions {
        let settings = ctx.settings();
        BridgeOptions::from([
            ("project_dir".to_string(), project.dir.display().to_string()),
            ("repo_name".to_string(), project.code().to_string()),
            (
                "model_version".to_string(),
                settings.default_model_version.to_string(),
            ),
            (
                "remote_uri".to_string(),
                format!("{}/{}", settings.remote_uri.trim_end_matches('/'), project.code()),
            ),
            ("delete_repo_if_no_such_branch".to_string(), "false".to_string()),
            ("only_repair".to_string(), repair.to_string()),
        ])
    }

    fn on_no_such_branch(
        project: &mut SyncProject,
        ctx: &SyncContext,
        line: &str,
    ) -> Result<(), ActionError> {
        let minimal = ctx.settings().minimal_model_version;
        match model_version_after(line, HIGHEST_AVAILABLE_MODEL) {
            None => {
                Self::remove_clone_dir(project)?;
                Self::hold(project, ErrorCode::UnspecifiedBranchError, line)
            }
            Some(version) if version < minimal => {
                Self::remove_clone_dir(project)?;
                Self::hold(project, ErrorCode::ProjectTooOld, line)?;
                error!(
                    project = %project.code(),
                    version,
                    minimal,
                    "clone model version less than minimal supported model version"
                );
                Ok(())
            }
            Some(version) => {
                info!(project = %project.code(), "{line}");
                project.cloned_this_turn = true;
                project.model_version = Some(version);
                project.treat_as_initial_clone = true;
                Ok(())
            }
        }
    }

    fn on_clone_created(project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        project.cloned_this_turn = true;
        project.model_version = Some(ctx.settings().default_model_version);
        let has_data = ctx.documents().has_user_data_or_synced(project.code())?;
        if has_data && !project.treat_as_initial_clone {
            // The remote may hold data the lost clone never saw; a normal
            // sync picks it up.
            debug!(project = %project.code(), "not an initial clone");
            return Ok(());
        }
        info!(project = %project.code(), "initial transfer to remote store after clone");
        project.is_initial_clone = true;
        ctx.run(ActionKind::TransferLocalToRemote, project)?;
        project.is_initial_clone = false;
        info!(project = %project.code(), "initial clone completed; setting state to CLONED");
        project.state.set_status(Status::Cloned)?;
        Ok(())
    }
}

fn hold_code(needle: &str) -> ErrorCode {
    match needle {
        "clone is not a FLEx project" => ErrorCode::NoFlexProject,
        "new repository with no commits" => ErrorCode::EmptyProject,
        "clone has higher model" => ErrorCode::ProjectTooNew,
        _ => ErrorCode::Unspecified,
    }
}

impl Action for EnsureCloneAction {
    fn kind(&self) -> ActionKind {
        ActionKind::EnsureClone
    }

    fn status_for_action(&self, project: &SyncProject) -> Status {
        project.status().clone()
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn pre_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        if !ctx.states().exists(project.code()) {
            project.state.set_status(Status::Cloning)?;
        }
        Ok(())
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        let have_clone = ctx.domain().exists(&project.dir);
        if *project.status() != Status::Cloning && have_clone {
            return Ok(());
        }

        let repair = project.dir.is_dir();
        if repair {
            info!(project = %project.code(), "repairing clone");
        } else {
            info!(project = %project.code(), "initial clone");
        }
        project.state.set_status(Status::Cloning)?;

        let options = Self::clone_options(project, ctx, repair);
        let progress = LogProgress {
            project: project.code().as_str(),
        };
        let output = match ctx.bridge().execute(BridgeOp::Clone, &progress, &options) {
            Ok(output) => output,
            Err(err @ ActionError::Unauthorized { .. }) => {
                error!(project = %project.code(), "initial clone: authorization exception");
                let reason = format!(
                    "Error during initial clone of {}: authorization exception from remote repository",
                    project.code()
                );
                project.state.put_on_hold_with(ErrorCode::Unauthorized, &reason)?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        if !output.ok {
            return Err(ActionError::CloneFailed(output.text.trim().to_string()));
        }

        match scan(&output.text, CLONE_SENTINELS) {
            SentinelMatch::Match { kind: CloneOutcome::Hold, needle, line } => {
                Self::hold(project, hold_code(needle), line)
            }
            SentinelMatch::Match { kind: CloneOutcome::NoSuchBranch, line, .. } => {
                Self::on_no_such_branch(project, ctx, line)
            }
            SentinelMatch::Match { kind: CloneOutcome::CloneCreated, .. } => {
                Self::on_clone_created(project, ctx)
            }
            SentinelMatch::Match { kind: CloneOutcome::TransientNetwork, line, .. } => {
                warn!(project = %project.code(), "{line}");
                Err(ActionError::TransientNetwork(line.to_string()))
            }
            SentinelMatch::NoMatch => Err(ActionError::UnexpectedOutput {
                op: BridgeOp::Clone,
                detail: "clone reported success without a recognizable result".into(),
            }),
        }
    }
}
