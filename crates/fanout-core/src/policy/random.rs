// crates/fanout-core/src/policy/random.rs
//
// Uniform single-choice placement, blind to load. The baseline that the
// power-of-two-choices policy is measured against.

use rand::rngs::StdRng;
use rand::Rng;

use crate::policy::PolicyKind;
use crate::pool::{Admission, WorkerPool};
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl DispatchPolicy for RandomPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Random
    }

    fn admission(&self) -> Admission {
        Admission::Blind
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        if pool.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(0..pool.len()))
    }
}
