// crates/fanout-core/src/policy/least_connections.rs
//
// Least connections: the worker with the fewest active tasks wins; ties go to
// the lowest worker index. Quality depends entirely on completions arriving
// promptly to bring active counts back down.

use crate::policy::PolicyKind;
use crate::pool::WorkerPool;
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone, Default)]
pub struct LeastConnectionsPolicy;

impl LeastConnectionsPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchPolicy for LeastConnectionsPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::LeastConnections
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        // min_by_key keeps the first of several equal minima.
        pool.idle_workers().min_by_key(|&w| pool.load().active(w))
    }
}
