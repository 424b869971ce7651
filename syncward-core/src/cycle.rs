//! Fixed action ordering, cyclic traversal and the action ↔ stage mapping.
//!
//! Traversal is defined over [`ACTION_ORDER`] rather than the enum's integer
//! representation, so reordering variants cannot change sweep order.

use crate::types::{ActionKind, QueueStage};

/// Pipeline order. Incrementing past the last entry wraps to the first.
pub const ACTION_ORDER: [ActionKind; 7] = [
    ActionKind::None,
    ActionKind::EnsureClone,
    ActionKind::TransferRemoteToLocal,
    ActionKind::Commit,
    ActionKind::Synchronize,
    ActionKind::Edit,
    ActionKind::TransferLocalToRemote,
];

/// The action every sweep starts from: the action of the `Edit` queue.
pub fn first_action() -> ActionKind {
    action_for_stage(QueueStage::Edit)
}

/// Next kind in [`ACTION_ORDER`], wrapping around.
pub fn successor(kind: ActionKind) -> ActionKind {
    let idx = position(kind);
    ACTION_ORDER[(idx + 1) % ACTION_ORDER.len()]
}

/// Every kind exactly once starting at `start` (inclusive), then the
/// `None` terminator.
pub fn cycle_from(start: ActionKind) -> Vec<ActionKind> {
    let mut kinds = Vec::with_capacity(ACTION_ORDER.len() + 1);
    kinds.push(start);
    let mut kind = successor(start);
    while kind != start {
        kinds.push(kind);
        kind = successor(kind);
    }
    kinds.push(ActionKind::None);
    kinds
}

/// The queue an action's projects wait on. Several kinds share `None`:
/// they only ever run inline from another action.
pub fn stage_for_action(kind: ActionKind) -> QueueStage {
    match kind {
        ActionKind::Edit => QueueStage::Edit,
        // Pulling remote edits in is the first half of a synchronize run.
        ActionKind::TransferRemoteToLocal | ActionKind::Synchronize => QueueStage::Synchronize,
        ActionKind::None
        | ActionKind::EnsureClone
        | ActionKind::Commit
        | ActionKind::TransferLocalToRemote => QueueStage::None,
    }
}

/// The action run for projects dequeued from `stage`.
pub fn action_for_stage(stage: QueueStage) -> ActionKind {
    match stage {
        QueueStage::Edit => ActionKind::Edit,
        QueueStage::Synchronize => ActionKind::Synchronize,
        QueueStage::None => ActionKind::None,
    }
}

fn position(kind: ActionKind) -> usize {
    ACTION_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn successor_wraps_past_last() {
        assert_eq!(
            successor(ActionKind::TransferLocalToRemote),
            ActionKind::None
        );
        assert_eq!(successor(ActionKind::None), ActionKind::EnsureClone);
    }

    #[test]
    fn cycle_visits_every_kind_once_then_terminates() {
        for start in ACTION_ORDER {
            let kinds = cycle_from(start);
            assert_eq!(kinds[0], start);
            assert_eq!(*kinds.last().unwrap(), ActionKind::None);
            let body: HashSet<_> = kinds[..kinds.len() - 1].iter().collect();
            assert_eq!(body.len(), ACTION_ORDER.len(), "start {start}");
        }
    }

    #[test]
    fn cycle_from_edit_order() {
        assert_eq!(
            cycle_from(ActionKind::Edit),
            vec![
                ActionKind::Edit,
                ActionKind::TransferLocalToRemote,
                ActionKind::None,
                ActionKind::EnsureClone,
                ActionKind::TransferRemoteToLocal,
                ActionKind::Commit,
                ActionKind::Synchronize,
                ActionKind::None,
            ]
        );
    }

    #[test]
    fn stage_mapping_round_trips_for_real_stages() {
        for stage in QueueStage::REAL {
            assert_eq!(stage_for_action(action_for_stage(stage)), stage);
        }
        assert_eq!(first_action(), ActionKind::Edit);
        assert_eq!(stage_for_action(ActionKind::Commit), QueueStage::None);
    }
}
