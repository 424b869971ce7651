//! Send/receive with the remote repository, bracketed by transfers from
//! and back to the remote document store.

use tracing::{error, info};

use syncward_core::{ActionKind, ErrorCode, Status};

use crate::action::Action;
use crate::bridge::{
    model_version_after, scan, BridgeOp, BridgeOptions, LogProgress, SentinelMatch,
    SyncOutcome, SYNC_SENTINELS,
};
use crate::context::SyncContext;
use crate::error::ActionError;
use crate::project::SyncProject;

#[derive(Debug, Clone, Copy, Default)]
pub struct SynchronizeAction;

impl SynchronizeAction {
    fn hold(project: &mut SyncProject, code: ErrorCode, line: &str) -> Result<(), ActionError> {
        error!(project = %project.code(), "{line}");
        let reason = format!("Error during synchronize of {}: {line}", project.code());
        project.state.put_on_hold_with(code, &reason)?;
        Ok(())
    }

    fn sync_options(project: &SyncProject, ctx: &SyncContext, message: &str) -> BridgeOptions {
        let settings = ctx.settings();
        BridgeOptions::from([
            ("project_dir".to_string(), project.dir.display().to_string()),
            (
                "model_version".to_string(),
                project
                    .model_version_or(settings.default_model_version)
                    .to_string(),
            ),
            (
                "remote_uri".to_string(),
                format!("{}/{}", settings.remote_uri.trim_end_matches('/'), project.code()),
            ),
            ("commit_message".to_string(), message.to_string()),
        ])
    }
}

impl Action for SynchronizeAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Synchronize
    }

    fn status_for_action(&self, _project: &SyncProject) -> Status {
        Status::Syncing
    }

    fn next_action_kind(&self) -> ActionKind {
        ActionKind::None
    }

    fn do_run(&self, project: &mut SyncProject, ctx: &SyncContext) -> Result<(), ActionError> {
        ctx.run(ActionKind::TransferRemoteToLocal, project)?;

        info!(project = %project.code(), "syncing");
        let message = project.entry_counts.commit_message();
        let options = Self::sync_options(project, ctx, &message);
        let progress = LogProgress {
            project: project.code().as_str(),
        };
        let output = ctx.bridge().execute(BridgeOp::SendReceive, &progress, &options)?;
        if !output.ok {
            error!(project = %project.code(), output = %output.text, "send/receive failed");
            return Ok(());
        }

        let minimal = ctx.settings().minimal_model_version;
        match scan(&output.text, SYNC_SENTINELS) {
            SentinelMatch::Match { kind: SyncOutcome::ModelVersionBranch, needle, line } => {
                let version = model_version_after(line, needle).ok_or_else(|| {
                    ActionError::UnexpectedOutput {
                        op: BridgeOp::SendReceive,
                        detail: format!("no model version in '{line}'"),
                    }
                })?;
                if version < minimal {
                    Self::hold(project, ErrorCode::ProjectTooOld, line)?;
                    error!(
                        project = %project.code(),
                        version,
                        minimal,
                        "clone model version less than minimal supported model version"
                    );
                } else {
                    project.model_version = Some(version);
                }
                return Ok(());
            }
            SentinelMatch::Match { kind: SyncOutcome::AllowMigration, needle, line } => {
                if let Some(version) = model_version_after(line, needle) {
                    project.model_version = Some(version);
                    info!(project = %project.code(), version, "allow data migration");
                }
                project.allow_data_migration = true;
                return Ok(());
            }
            SentinelMatch::Match { kind: SyncOutcome::Hold, line, .. } => {
                return Self::hold(project, ErrorCode::Unspecified, line);
            }
            SentinelMatch::Match { kind: SyncOutcome::LogOnly, line, .. } => {
                error!(project = %project.code(), "{line}");
                return Ok(());
            }
            SentinelMatch::Match { kind: SyncOutcome::TransientNetwork, line, .. } => {
                return Err(ActionError::TransientNetwork(line.to_string()));
            }
            SentinelMatch::Match {
                kind: SyncOutcome::NoChanges | SyncOutcome::ReceivedChanges,
                line,
                ..
            } => {
                info!(project = %project.code(), "{line}");
            }
            SentinelMatch::NoMatch => {
                error!(project = %project.code(), output = %output.text, "unhandled sync failure");
                return Ok(());
            }
        }

        // Always transfer back: entries marked deleted must leave the remote.
        ctx.run(ActionKind::TransferLocalToRemote, project)
    }
}
