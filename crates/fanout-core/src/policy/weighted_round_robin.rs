// crates/fanout-core/src/policy/weighted_round_robin.rs
//
// Smooth weighted round robin (the nginx variant). Every selection adds each
// worker's weight to its running score, picks the highest score (lowest index
// on ties), and subtracts the total weight from the winner. Heavier workers
// are chosen proportionally more often without being chosen in bursts.

use crate::policy::PolicyKind;
use crate::pool::{Admission, WorkerPool};
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone, Default)]
pub struct WeightedRoundRobinPolicy {
    current: Vec<i64>,
}

impl WeightedRoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            current: Vec::new(),
        }
    }

    /// Running scores after the most recent selection.
    pub fn current_weights(&self) -> &[i64] {
        &self.current
    }
}

impl DispatchPolicy for WeightedRoundRobinPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::WeightedRoundRobin
    }

    fn admission(&self) -> Admission {
        Admission::Blind
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        let weights = pool.weights();
        if weights.is_empty() {
            return None;
        }
        if self.current.len() != weights.len() {
            self.current = vec![0; weights.len()];
        }
        let total: i64 = weights.iter().map(|&w| w as i64).sum();

        let mut best: Option<WorkerId> = None;
        for (i, &w) in weights.iter().enumerate() {
            self.current[i] += w as i64;
            if best.map_or(true, |b| self.current[i] > self.current[b]) {
                best = Some(i);
            }
        }
        if let Some(b) = best {
            self.current[b] -= total;
        }
        best
    }
}
