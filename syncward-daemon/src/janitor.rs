//! Startup recovery for projects a crash left mid-flight.

use tracing::{debug, error};

use syncward_core::{ProjectCode, QueueStage, Status};
use syncward_pipeline::{SyncContext, UncleanStateError};
use syncward_queue::QueueError;

use crate::error::DaemonError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JanitorSummary {
    pub inspected: usize,
    pub rescheduled: Vec<ProjectCode>,
}

/// Demote every project found in a transient or unrecognized status to
/// IDLE and queue it for synchronize. Each one is reported to the crash
/// reporter. Quiescent projects are not touched.
pub fn clean_up_after_crash(ctx: &SyncContext) -> Result<JanitorSummary, DaemonError> {
    let sync_queue = ctx
        .queues()
        .get(QueueStage::Synchronize)
        .ok_or(QueueError::InvalidStage(QueueStage::Synchronize))?;

    let mut summary = JanitorSummary::default();
    for code in ctx.states().codes()? {
        let mut state = ctx.states().open(&code)?;
        summary.inspected += 1;

        let status = state.status().clone();
        if status.is_quiescent() {
            debug!(project = %code, status = %status, "clean state");
            continue;
        }

        let unclean = UncleanStateError::for_status(code.clone(), status.clone());
        error!(project = %code, status = %status, "{unclean}");
        ctx.crash_reporter().notify(&unclean);

        state.set_status(Status::Idle)?;
        sync_queue.enqueue(&code)?;
        summary.rescheduled.push(code);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use syncward_pipeline::testing::Harness;
    use tempfile::TempDir;

    fn seed(harness: &Harness, code: &str, status: Status) {
        let mut state = harness.ctx.states().open(&ProjectCode::from(code)).unwrap();
        state.set_status(status).unwrap();
    }

    fn sync_queue(harness: &Harness) -> Vec<ProjectCode> {
        harness
            .ctx
            .queues()
            .get(QueueStage::Synchronize)
            .unwrap()
            .queued_projects(None)
            .unwrap()
    }

    #[rstest]
    #[case(Status::Cloned)]
    #[case(Status::Idle)]
    #[case(Status::Hold)]
    #[case(Status::Error)]
    fn quiescent_states_are_left_alone(#[case] status: Status) {
        let tmp = TempDir::new().unwrap();
        let harness = Harness::new(tmp.path());
        seed(&harness, "proja", status.clone());

        let summary = clean_up_after_crash(&harness.ctx).unwrap();

        assert_eq!(summary.inspected, 1);
        assert!(summary.rescheduled.is_empty());
        assert!(sync_queue(&harness).is_empty());
        assert!(harness.crashes.messages().is_empty());
        let state = harness.ctx.states().load(&ProjectCode::from("proja")).unwrap();
        assert_eq!(state.status, status);
    }

    #[rstest]
    #[case(Status::Cloning, "CLONING")]
    #[case(Status::Syncing, "SYNCING")]
    fn transient_states_are_rescheduled(#[case] status: Status, #[case] name: &str) {
        let tmp = TempDir::new().unwrap();
        let harness = Harness::new(tmp.path());
        seed(&harness, "proja", status);

        let summary = clean_up_after_crash(&harness.ctx).unwrap();

        assert_eq!(summary.rescheduled, vec![ProjectCode::from("proja")]);
        assert_eq!(sync_queue(&harness), vec![ProjectCode::from("proja")]);
        let state = harness.ctx.states().load(&ProjectCode::from("proja")).unwrap();
        assert_eq!(state.status, Status::Idle);

        let messages = harness.crashes.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("'proja'"));
        assert!(messages[0].contains(&format!("unclean state '{name}'")));
    }

    #[test]
    fn unrecognized_state_is_reported_as_unknown() {
        let tmp = TempDir::new().unwrap();
        let harness = Harness::new(tmp.path());
        seed(&harness, "proja", Status::Unrecognized("42".to_owned()));

        clean_up_after_crash(&harness.ctx).unwrap();

        assert_eq!(sync_queue(&harness), vec![ProjectCode::from("proja")]);
        let messages = harness.crashes.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("unknown state '42'"));
        assert!(messages[0].contains("'proja'"));
    }
}
