// crates/fanout-core/src/policy/priority.rs
//
// Priority-queue dispatch: the queue does the work. Tasks leave the queue in
// (priority descending, submit order ascending) order and go to the first
// worker with spare capacity; worker identity is not a discriminator.

use crate::policy::PolicyKind;
use crate::pool::WorkerPool;
use crate::queue::QueueOrder;
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone, Default)]
pub struct PriorityQueuePolicy;

impl PriorityQueuePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchPolicy for PriorityQueuePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PriorityQueue
    }

    fn queue_order(&self) -> QueueOrder {
        QueueOrder::Priority
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        pool.idle_workers().next()
    }
}
