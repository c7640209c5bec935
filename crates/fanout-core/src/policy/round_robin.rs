// crates/fanout-core/src/policy/round_robin.rs
//
// Blind round robin: workers[next], then next = (next + 1) mod N.
//
// There is no idleness check. A busy worker still receives its turn and the
// pool accepts the over-commitment; completions never influence the cycle.

use crate::policy::PolicyKind;
use crate::pool::{Admission, WorkerPool};
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone, Default)]
pub struct RoundRobinPolicy {
    next_index: usize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self { next_index: 0 }
    }

    /// Index the next selection will return.
    pub fn next_index(&self) -> usize {
        self.next_index
    }
}

impl DispatchPolicy for RoundRobinPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn admission(&self) -> Admission {
        Admission::Blind
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        let n = pool.len();
        if n == 0 {
            return None;
        }
        let selected = self.next_index % n;
        self.next_index = (selected + 1) % n;
        Some(selected)
    }
}
