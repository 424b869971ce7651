//! Every real stage's queue, built once and looked up by stage.

use std::collections::BTreeMap;

use syncward_core::cycle::{cycle_from, first_action, stage_for_action};
use syncward_core::{ActionKind, QueueStage, Settings};

use crate::error::QueueError;
use crate::queue::Queue;

#[derive(Debug, Clone)]
pub struct QueueSet {
    queues: BTreeMap<QueueStage, Queue>,
}

impl QueueSet {
    pub fn new(settings: &Settings) -> Result<Self, QueueError> {
        let mut queues = BTreeMap::new();
        for stage in QueueStage::REAL {
            queues.insert(stage, Queue::new(stage, settings)?);
        }
        Ok(Self { queues })
    }

    /// `None` only for [`QueueStage::None`].
    pub fn get(&self, stage: QueueStage) -> Option<&Queue> {
        self.queues.get(&stage)
    }

    /// The queue projects wait on before running `kind`, if it has one.
    pub fn for_action(&self, kind: ActionKind) -> Option<&Queue> {
        self.get(stage_for_action(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Queue> {
        self.queues.values()
    }

    /// First non-empty queue met walking the action cycle from `start`
    /// (inclusive).
    pub fn next_queue_with_work(&self, start: ActionKind) -> Result<Option<&Queue>, QueueError> {
        for kind in cycle_from(start) {
            if let Some(queue) = self.for_action(kind) {
                if !queue.is_empty()? {
                    return Ok(Some(queue));
                }
            }
        }
        Ok(None)
    }

    pub fn first_queue_with_work(&self) -> Result<Option<&Queue>, QueueError> {
        self.next_queue_with_work(first_action())
    }
}
