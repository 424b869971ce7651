//! Cross-stage queue lookup over a real settings layout.

use rstest::rstest;
use syncward_core::{ActionKind, ProjectCode, QueueStage, Settings};
use syncward_queue::QueueSet;
use tempfile::TempDir;

fn queues(tmp: &TempDir) -> QueueSet {
    let settings = Settings::with_base_dir(tmp.path());
    QueueSet::new(&settings).expect("queue set")
}

#[test]
fn all_empty_returns_none() {
    let tmp = TempDir::new().expect("tempdir");
    let queues = queues(&tmp);
    assert!(queues.first_queue_with_work().expect("lookup").is_none());
    assert!(queues
        .next_queue_with_work(ActionKind::Commit)
        .expect("lookup")
        .is_none());
}

#[rstest]
#[case(ActionKind::None)]
#[case(ActionKind::EnsureClone)]
#[case(ActionKind::TransferRemoteToLocal)]
#[case(ActionKind::Commit)]
#[case(ActionKind::Synchronize)]
#[case(ActionKind::Edit)]
#[case(ActionKind::TransferLocalToRemote)]
fn only_synchronize_has_work(#[case] start: ActionKind) {
    let tmp = TempDir::new().expect("tempdir");
    let queues = queues(&tmp);
    queues
        .get(QueueStage::Synchronize)
        .expect("sync queue")
        .enqueue(&ProjectCode::from("proja"))
        .expect("enqueue");

    let found = queues.next_queue_with_work(start).expect("lookup");
    assert_eq!(found.map(|q| q.stage()), Some(QueueStage::Synchronize));
}

#[test]
fn cycle_order_prefers_edit_from_first_action() {
    let tmp = TempDir::new().expect("tempdir");
    let queues = queues(&tmp);
    for stage in QueueStage::REAL {
        queues
            .get(stage)
            .expect("queue")
            .enqueue(&ProjectCode::from("proja"))
            .expect("enqueue");
    }
    let first = queues.first_queue_with_work().expect("lookup").expect("work");
    assert_eq!(first.stage(), QueueStage::Edit);

    let after_edit = queues
        .next_queue_with_work(ActionKind::TransferLocalToRemote)
        .expect("lookup")
        .expect("work");
    assert_eq!(after_edit.stage(), QueueStage::Synchronize);
}

#[test]
fn sentinel_stage_is_absent_from_set() {
    let tmp = TempDir::new().expect("tempdir");
    let queues = queues(&tmp);
    assert!(queues.get(QueueStage::None).is_none());
    assert!(queues.for_action(ActionKind::Commit).is_none());
    assert_eq!(queues.iter().count(), 2);
}
