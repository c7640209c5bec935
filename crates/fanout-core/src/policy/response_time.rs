// crates/fanout-core/src/policy/response_time.rs
//
// Response-time balancing. Each worker is scored as
//
//   score = ema + (ema, or 100ms if no samples yet) * active
//
// where `ema` is the worker's smoothed completion latency (0 before the first
// sample). Lowest score wins; ties go to the lowest index. Workers without
// samples score low while idle, so every worker gets tried early.

use crate::policy::PolicyKind;
use crate::pool::{Admission, WorkerPool};
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

/// Latency assumed for the busy penalty before a worker has any samples.
pub const DEFAULT_LATENCY_ESTIMATE_MS: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct ResponseTimePolicy;

impl ResponseTimePolicy {
    pub fn new() -> Self {
        Self
    }

    /// Score of `worker` under the current load signals.
    pub fn score(pool: &WorkerPool, worker: WorkerId) -> f64 {
        let load = pool.load();
        let ema = load.latency_ema_ms(worker);
        let base = ema.unwrap_or(0.0);
        let estimate = ema.unwrap_or(DEFAULT_LATENCY_ESTIMATE_MS);
        base + estimate * load.active(worker) as f64
    }
}

impl DispatchPolicy for ResponseTimePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ResponseTime
    }

    fn admission(&self) -> Admission {
        Admission::Blind
    }

    fn select(&mut self, _task: &Task, pool: &WorkerPool) -> Option<WorkerId> {
        let mut best: Option<(WorkerId, f64)> = None;
        for worker in 0..pool.len() {
            let score = Self::score(pool, worker);
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((worker, score));
            }
        }
        best.map(|(w, _)| w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRequest;
    use std::time::Duration;

    fn task(id: u64) -> Task {
        Task::from_request(id, id, TaskRequest::new(Duration::from_millis(1)))
    }

    #[test]
    fn test_prefers_faster_worker() {
        let mut pool = WorkerPool::with_workers(2, 4).unwrap();
        pool.record_completion(0, Duration::from_millis(300)).unwrap();
        pool.record_completion(1, Duration::from_millis(50)).unwrap();
        let mut policy = ResponseTimePolicy::new();
        assert_eq!(policy.select(&task(1), &pool), Some(1));
    }

    #[test]
    fn test_busy_penalty() {
        let mut pool = WorkerPool::with_workers(2, 4).unwrap();
        pool.record_completion(0, Duration::from_millis(100)).unwrap();
        pool.record_completion(1, Duration::from_millis(60)).unwrap();
        pool.assign(1, &task(1)).unwrap();
        // worker 0: 100 + 0, worker 1: 60 + 60
        assert!((ResponseTimePolicy::score(&pool, 0) - 100.0).abs() < 1e-9);
        assert!((ResponseTimePolicy::score(&pool, 1) - 120.0).abs() < 1e-9);
        assert_eq!(ResponseTimePolicy::new().select(&task(2), &pool), Some(0));
    }

    #[test]
    fn test_unsampled_workers_tried_in_order() {
        let mut pool = WorkerPool::with_workers(3, 4).unwrap();
        let mut policy = ResponseTimePolicy::new();
        for expected in 0..3 {
            let t = task(expected as u64);
            let w = policy.select(&t, &pool).unwrap();
            assert_eq!(w, expected);
            pool.assign(w, &t).unwrap();
        }
    }
}
