//! Whole sweeps against the in-memory collaborators.

use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use syncward_core::{ProjectCode, QueueStage, Status};
use syncward_daemon::{run_once_with, HostLock, RunOutcome, Scheduler};
use syncward_pipeline::bridge::BridgeOp;
use syncward_pipeline::testing::Harness;
use tempfile::TempDir;

fn queued(h: &Harness, stage: QueueStage) -> Vec<ProjectCode> {
    h.ctx
        .queues()
        .get(stage)
        .expect("real stage")
        .queued_projects(None)
        .expect("queued")
}

fn enqueue(h: &Harness, stage: QueueStage, code: &str) {
    h.ctx
        .queues()
        .get(stage)
        .expect("real stage")
        .enqueue(&ProjectCode::from(code))
        .expect("enqueue");
}

fn status(h: &Harness, code: &str) -> Status {
    h.ctx
        .states()
        .load(&ProjectCode::from(code))
        .expect("load")
        .status
}

#[test]
fn edit_flows_through_commit_into_synchronize_in_one_sweep() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    h.cloned_project("proja");
    enqueue(&h, QueueStage::Edit, "proja");

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.per_stage.get(&QueueStage::Edit), Some(&1));
    assert_eq!(summary.per_stage.get(&QueueStage::Synchronize), Some(&1));
    assert!(queued(&h, QueueStage::Edit).is_empty());
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
    assert_eq!(h.bridge.ops(), vec![BridgeOp::SendReceive]);
    assert_eq!(status(&h, "proja"), Status::Idle);

    let commits = h
        .domain
        .data(&h.ctx.settings().project_dir(&ProjectCode::from("proja")))
        .expect("local store")
        .commits;
    assert_eq!(commits.len(), 1);
}

#[test]
fn priority_project_rotates_the_queue() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    let queue = h.ctx.queues().get(QueueStage::Synchronize).expect("queue");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("time");
    for (i, code) in ["projc", "projb", "proja", "projd"].into_iter().enumerate() {
        h.cloned_project(code);
        queue
            .enqueue_at(&ProjectCode::from(code), start + Duration::seconds(i as i64))
            .expect("enqueue");
    }

    Scheduler::new(&h.ctx, Some(ProjectCode::from("projb")))
        .sweep()
        .expect("sweep");

    let order: Vec<String> = h
        .bridge
        .calls()
        .into_iter()
        .map(|(_, options)| {
            let dir = options.get("project_dir").cloned().unwrap_or_default();
            dir.rsplit('/').next().unwrap_or_default().to_owned()
        })
        .collect();
    assert_eq!(order, vec!["projb", "proja", "projd", "projc"]);
}

#[test]
fn one_failing_project_does_not_stop_the_sweep() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    let queue = h.ctx.queues().get(QueueStage::Synchronize).expect("queue");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("time");
    for (i, code) in ["first", "second"].into_iter().enumerate() {
        h.cloned_project(code);
        queue
            .enqueue_at(&ProjectCode::from(code), start + Duration::seconds(i as i64))
            .expect("enqueue");
    }
    h.bridge.push_unauthorized();

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.bridge.ops().len(), 2);
    assert_eq!(status(&h, "first"), Status::Idle);
    assert_eq!(status(&h, "second"), Status::Idle);
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
    assert_eq!(h.crashes.messages().len(), 1);
}

#[test]
fn transient_network_failure_requeues_the_project() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    h.cloned_project("flaky");
    enqueue(&h, QueueStage::Synchronize, "flaky");
    h.bridge
        .push_output("abort: Temporary failure in name resolution");

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.failed, 1);
    assert_eq!(queued(&h, QueueStage::Synchronize), vec![ProjectCode::from("flaky")]);
    assert_eq!(status(&h, "flaky"), Status::Idle);
    assert_eq!(h.bridge.ops().len(), 1, "requeued work waits for the next sweep");
    let record = h.ctx.states().load(&ProjectCode::from("flaky")).expect("load");
    assert_eq!(record.retry_counter, 1);

    Scheduler::new(&h.ctx, None).sweep().expect("second sweep");
    let record = h.ctx.states().load(&ProjectCode::from("flaky")).expect("load");
    assert_eq!(record.retry_counter, 0);
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
}

#[test]
fn retry_backoff_defers_a_project_that_just_failed() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    h.cloned_project("flaky");
    enqueue(&h, QueueStage::Synchronize, "flaky");
    h.bridge
        .push_output("abort: Temporary failure in name resolution");
    let scheduler = Scheduler::new(&h.ctx, None).with_retry_backoff(StdDuration::from_secs(3600));

    let first = scheduler.sweep().expect("sweep");
    assert_eq!(first.failed, 1);
    assert_eq!(queued(&h, QueueStage::Synchronize), vec![ProjectCode::from("flaky")]);

    let second = scheduler.sweep().expect("second sweep");
    assert_eq!(second.processed, 0);
    assert_eq!(second.deferred, 1);
    assert_eq!(h.bridge.ops().len(), 1, "no remote call before the delay passes");
    assert_eq!(queued(&h, QueueStage::Synchronize), vec![ProjectCode::from("flaky")]);

    // Age the failure past the delay. `TrackedState::update` would restamp it.
    let mut record = h.ctx.states().load(&ProjectCode::from("flaky")).expect("load");
    record.last_state_change = Utc::now() - Duration::hours(2);
    h.ctx.states().save(&record).expect("save");

    let third = scheduler.sweep().expect("third sweep");
    assert_eq!(third.processed, 1);
    assert_eq!(third.deferred, 0);
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
}

#[test]
fn failed_clone_is_retried_on_the_next_sweep() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    enqueue(&h, QueueStage::Synchronize, "newcomer");
    h.bridge.push_failure("abort: could not clone");
    let dir = h.ctx.settings().project_dir(&ProjectCode::from("newcomer"));

    let first = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(first.failed, 1);
    assert_eq!(h.bridge.ops(), vec![BridgeOp::Clone]);
    assert!(h.domain.data(&dir).is_none(), "no local store without a clone");
    assert_ne!(status(&h, "newcomer"), Status::Cloned);
    assert_eq!(queued(&h, QueueStage::Synchronize), vec![ProjectCode::from("newcomer")]);

    Scheduler::new(&h.ctx, None).sweep().expect("second sweep");

    assert_eq!(h.bridge.ops(), vec![BridgeOp::Clone, BridgeOp::Clone]);
    assert_eq!(status(&h, "newcomer"), Status::Cloned);
    assert!(h.domain.data(&dir).is_some());
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
}

#[test]
fn held_project_is_dequeued_without_work() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    let mut project = h.cloned_project("stuck");
    project.state.put_on_hold("operator says stop").expect("hold");
    enqueue(&h, QueueStage::Synchronize, "stuck");

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.failed, 0);
    assert!(h.bridge.calls().is_empty());
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
    assert_eq!(status(&h, "stuck"), Status::Hold);
}

#[test]
fn fresh_project_turn_ends_after_initial_clone() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    enqueue(&h, QueueStage::Edit, "fresh");

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.processed, 1);
    assert_eq!(h.bridge.ops(), vec![BridgeOp::Clone]);
    assert_eq!(status(&h, "fresh"), Status::Cloned);
    assert!(queued(&h, QueueStage::Edit).is_empty());
    assert!(queued(&h, QueueStage::Synchronize).is_empty());
}

#[test]
fn empty_queues_make_an_empty_sweep() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());

    let summary = Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    assert_eq!(summary.processed, 0);
    assert!(summary.per_stage.is_empty());
}

#[test]
fn run_records_turn_duration() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    h.cloned_project("timed");
    enqueue(&h, QueueStage::Synchronize, "timed");

    Scheduler::new(&h.ctx, None).sweep().expect("sweep");

    let record = h.ctx.states().load(&ProjectCode::from("timed")).expect("load");
    assert!(record.previous_run_total_ms < 60_000);
    assert!(record.last_state_change >= record.created_at);
}

#[test]
fn locked_run_touches_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    h.cloned_project("proja");
    enqueue(&h, QueueStage::Synchronize, "proja");
    let _held = HostLock::require(&h.ctx.settings().lock_file()).expect("lock");

    let outcome = run_once_with(&h.ctx, None).expect("run");

    assert!(matches!(outcome, RunOutcome::LockHeld { .. }));
    assert_eq!(queued(&h, QueueStage::Synchronize), vec![ProjectCode::from("proja")]);
    assert!(h.bridge.calls().is_empty());
}

#[test]
fn run_recovers_crashed_projects_before_sweeping() {
    let tmp = TempDir::new().expect("tempdir");
    let h = Harness::new(tmp.path());
    let mut project = h.cloned_project("crashed");
    project.state.set_status(Status::Syncing).expect("seed");

    let outcome = run_once_with(&h.ctx, None).expect("run");

    let RunOutcome::Completed { janitor, sweep } = outcome else {
        panic!("lock should be free");
    };
    assert_eq!(janitor.rescheduled, vec![ProjectCode::from("crashed")]);
    assert_eq!(sweep.per_stage.get(&QueueStage::Synchronize), Some(&1));
    assert_eq!(h.bridge.ops(), vec![BridgeOp::SendReceive]);
    assert_eq!(status(&h, "crashed"), Status::Idle);
    assert_eq!(h.crashes.messages().len(), 1);
    assert!(HostLock::acquire(&h.ctx.settings().lock_file())
        .expect("lock")
        .is_some());
}
