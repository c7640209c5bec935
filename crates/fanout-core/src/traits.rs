// crates/fanout-core/src/traits.rs

use crate::error::{FanoutError, Result};
use crate::policy::{MembershipChange, PolicyKind};
use crate::pool::{Admission, WorkerPool};
use crate::queue::QueueOrder;
use crate::ring::{HashRing, RebalanceReport};
use crate::task::Task;
use crate::worker::WorkerId;

/// Strategy that decides which worker receives the next task.
///
/// Implemented by every variant in `crate::policy`. Policies read pool state
/// passed to them; the only state they own is their own cursor, weights,
/// random generator or ring. All calls happen on the single thread that owns
/// the dispatcher.
pub trait DispatchPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Order of the task queue this policy expects.
    fn queue_order(&self) -> QueueOrder {
        QueueOrder::Fifo
    }

    /// Whether the dispatcher must respect worker capacity for this policy.
    fn admission(&self) -> Admission {
        Admission::Capacity
    }

    /// Pick a worker for `task`, or `None` to leave it queued.
    ///
    /// Under `Admission::Capacity` the returned worker must have spare
    /// capacity.
    fn select(&mut self, task: &Task, pool: &WorkerPool) -> Option<WorkerId>;

    /// The policy's hash ring, for policies that shard by key.
    fn ring(&self) -> Option<&HashRing> {
        None
    }

    /// Apply a membership change to policy-owned routing state.
    ///
    /// # Errors
    /// Returns `FanoutError::Unsupported` for policies without membership.
    fn membership(&mut self, change: MembershipChange, pool: &WorkerPool) -> Result<RebalanceReport> {
        let _ = pool;
        Err(FanoutError::Unsupported(format!(
            "{} does not support membership change {:?}",
            self.kind(),
            change
        )))
    }
}
