// crates/fanout-core/src/policy/power_of_two.rs
//
// Power of two choices: sample two distinct workers with spare capacity and
// take the less loaded one. On equal load the first sample wins, so ties are
// broken by the random draw rather than by worker index.
//
// Candidates come from workers with spare capacity. At capacity 1 every such
// worker has load 0, so the comparison never decides and placement is a
// uniform pick among idle workers. The load signal matters once capacity > 1.

use rand::rngs::StdRng;
use rand::Rng;

use crate::policy::PolicyKind;
use crate::pool::WorkerPool;
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone)]
pub struct PowerOfTwoChoicesPolicy {
    rng: StdRng,
    last_sample: Option<(WorkerId, WorkerId)>,
}

impl PowerOfTwoChoicesPolicy {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            last_sample: None,
        }
    }

    /// The two candidates compared by the most recent selection. Both entries
    /// are the same worker when only one worker had spare capacity.
    pub fn last_sample(&self) -> Option<(WorkerId, WorkerId)> {
        self.last_sample
    }
}

impl DispatchPolicy for PowerOfTwoChoicesPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PowerOfTwoChoices
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        let candidates: Vec<WorkerId> = pool.idle_workers().collect();
        let (a, b) = match candidates.len() {
            0 => {
                self.last_sample = None;
                return None;
            }
            1 => (candidates[0], candidates[0]),
            n => {
                let i = self.rng.gen_range(0..n);
                let mut j = self.rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                (candidates[i], candidates[j])
            }
        };
        self.last_sample = Some((a, b));
        let load = pool.load();
        if load.active(b) < load.active(a) {
            Some(b)
        } else {
            Some(a)
        }
    }
}
