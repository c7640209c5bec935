// crates/fanout-core/src/simulation.rs
//
// Discrete-event simulation of a dispatcher on a virtual clock.
//
// Each worker runs `capacity` lanes. An assigned task starts on the lane that
// frees up first (immediately if one is free), finishes `cost` later, and the
// completion is fed back to the dispatcher, which may assign more work.
// Arrivals sharing the same offset are submitted as one batch. Completions
// due at the same instant as an arrival are processed first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{PolicyConfig, PoolConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{FanoutError, Result};
use crate::policy::{seeded_rng, PolicyKind};
use crate::stats::LoadSummary;
use crate::task::{Priority, TaskId, TaskRequest};
use crate::worker::{AssignMessage, CompletionMessage, WorkerId};

/// A task request arriving `at` after the start of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub at: Duration,
    pub request: TaskRequest,
}

/// Parameters of a synthetic workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub tasks: usize,
    /// Gap between consecutive arrivals. 0 submits everything at once.
    pub interval_ms: u64,
    pub min_cost_ms: u64,
    pub max_cost_ms: u64,
    /// Number of distinct routing keys, drawn uniformly. 0 leaves tasks unkeyed.
    pub keys: usize,
    /// Draw a priority for every task.
    pub prioritized: bool,
    pub seed: Option<u64>,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            tasks: 100,
            interval_ms: 10,
            min_cost_ms: 20,
            max_cost_ms: 200,
            keys: 0,
            prioritized: false,
            seed: None,
        }
    }
}

impl Workload {
    /// Generate the arrivals described by this workload.
    ///
    /// # Errors
    /// Returns `FanoutError::InvalidConfig` if the cost range is inverted.
    pub fn generate(&self) -> Result<Vec<Arrival>> {
        if self.min_cost_ms > self.max_cost_ms {
            return Err(FanoutError::InvalidConfig(format!(
                "min_cost_ms {} exceeds max_cost_ms {}",
                self.min_cost_ms, self.max_cost_ms
            )));
        }
        let mut rng = seeded_rng(self.seed);
        let arrivals = (0..self.tasks)
            .map(|i| {
                let cost = rng.gen_range(self.min_cost_ms..=self.max_cost_ms);
                let mut request = TaskRequest::new(Duration::from_millis(cost));
                if self.prioritized {
                    request.priority = Some(Priority::ALL[rng.gen_range(0..Priority::ALL.len())]);
                }
                if self.keys > 0 {
                    request.key = Some(format!("key-{}", rng.gen_range(0..self.keys)));
                }
                Arrival {
                    at: Duration::from_millis(self.interval_ms * i as u64),
                    request,
                }
            })
            .collect();
        Ok(arrivals)
    }
}

/// One assignment made during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub at: Duration,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub policy: PolicyKind,
    /// Time at which the last task finished.
    pub makespan: Duration,
    pub completed: u64,
    /// Mean time from arrival to start of execution.
    pub mean_wait: Duration,
    pub max_wait: Duration,
    /// Tasks completed by each worker.
    pub per_worker: Vec<u64>,
    /// Summary of each worker's peak active count.
    pub peak_load: LoadSummary,
    pub assignments: Vec<AssignmentRecord>,
}

/// A dispatcher plus the virtual execution lanes it feeds.
pub struct Simulation {
    dispatcher: Dispatcher,
    /// Per worker, the time each lane becomes free.
    lanes: Vec<Vec<Duration>>,
    /// Pending completions: (finish, seq, worker, task).
    pending: BinaryHeap<Reverse<(Duration, u64, WorkerId, TaskId)>>,
    seq: u64,
    now: Duration,
    arrived_at: HashMap<TaskId, Duration>,
    assigned_at: HashMap<TaskId, Duration>,
    waits: Vec<Duration>,
    peak: Vec<usize>,
    assignments: Vec<AssignmentRecord>,
}

impl Simulation {
    pub fn new(pool: &PoolConfig, policy: &PolicyConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(pool, policy)?;
        Ok(Self::with_dispatcher(dispatcher))
    }

    /// Simulate an existing dispatcher. Its pool must be idle.
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        let lanes = dispatcher
            .pool_snapshot()
            .iter()
            .map(|w| vec![Duration::ZERO; w.capacity])
            .collect();
        let workers = dispatcher.pool().len();
        Self {
            dispatcher,
            lanes,
            pending: BinaryHeap::new(),
            seq: 0,
            now: Duration::ZERO,
            arrived_at: HashMap::new(),
            assigned_at: HashMap::new(),
            waits: Vec::new(),
            peak: vec![0; workers],
            assignments: Vec::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `arrivals` to completion.
    ///
    /// # Errors
    /// Propagates dispatcher errors, and returns `FanoutError::InvalidState`
    /// if work is left queued with nothing in flight to free it.
    pub fn run(mut self, mut arrivals: Vec<Arrival>) -> Result<SimulationReport> {
        arrivals.sort_by_key(|a| a.at);
        let mut arrivals = arrivals.into_iter().peekable();

        loop {
            let next_arrival = arrivals.peek().map(|a| a.at);
            let next_completion = self.pending.peek().map(|Reverse((t, ..))| *t);

            match (next_arrival, next_completion) {
                (None, None) => break,
                (Some(at), Some(done)) if done <= at => self.complete_next()?,
                (None, Some(_)) => self.complete_next()?,
                (Some(at), _) => {
                    self.now = at;
                    let mut batch = Vec::new();
                    while let Some(a) = arrivals.next_if(|a| a.at == at) {
                        batch.push(a.request);
                    }
                    let ids = self.dispatcher.submit_all(batch)?;
                    for id in ids {
                        self.arrived_at.insert(id, at);
                    }
                    self.schedule();
                }
            }
        }

        if !self.dispatcher.is_idle() {
            return Err(FanoutError::InvalidState(format!(
                "simulation stalled with {} tasks queued",
                self.dispatcher.queue_len()
            )));
        }
        Ok(self.report())
    }

    fn complete_next(&mut self) -> Result<()> {
        let Some(Reverse((finish, _, worker_id, task_id))) = self.pending.pop() else {
            return Ok(());
        };
        self.now = finish;
        let assigned = self.assigned_at.remove(&task_id).unwrap_or(finish);
        self.dispatcher.on_worker_complete(CompletionMessage {
            task_id,
            worker_id,
            elapsed: finish.saturating_sub(assigned),
        })?;
        self.schedule();
        Ok(())
    }

    /// Place newly assigned tasks on lanes and queue their completions.
    fn schedule(&mut self) {
        let messages: Vec<AssignMessage> = self.dispatcher.take_assignments();
        for message in messages {
            let worker = message.worker_id;
            let Some(lanes) = self.lanes.get_mut(worker) else {
                continue;
            };
            let Some((lane, free_at)) = lanes
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|&(i, t)| (t, i))
            else {
                continue;
            };
            let start = free_at.max(self.now);
            let finish = start + message.cost;
            lanes[lane] = finish;

            let arrived = self
                .arrived_at
                .remove(&message.task_id)
                .unwrap_or(self.now);
            self.waits.push(start.saturating_sub(arrived));
            self.assigned_at.insert(message.task_id, self.now);
            self.assignments.push(AssignmentRecord {
                task_id: message.task_id,
                worker_id: worker,
                at: self.now,
            });
            self.pending
                .push(Reverse((finish, self.seq, worker, message.task_id)));
            self.seq += 1;
        }
        let load = self.dispatcher.pool().load();
        for (worker, peak) in self.peak.iter_mut().enumerate() {
            *peak = (*peak).max(load.active(worker));
        }
    }

    fn report(self) -> SimulationReport {
        let completed = self.dispatcher.stats().completed;
        let total_wait: Duration = self.waits.iter().sum();
        let mean_wait = if self.waits.is_empty() {
            Duration::ZERO
        } else {
            total_wait / self.waits.len() as u32
        };
        SimulationReport {
            policy: self.dispatcher.policy_kind(),
            makespan: self.now,
            completed,
            mean_wait,
            max_wait: self.waits.iter().copied().max().unwrap_or(Duration::ZERO),
            per_worker: self
                .dispatcher
                .pool_snapshot()
                .iter()
                .map(|w| w.completed)
                .collect(),
            peak_load: LoadSummary::from_loads(&self.peak),
            assignments: self.assignments,
        }
    }
}

/// Run one policy over `arrivals` on a fresh pool.
pub fn simulate(
    pool: &PoolConfig,
    policy: &PolicyConfig,
    arrivals: Vec<Arrival>,
) -> Result<SimulationReport> {
    let report = Simulation::new(pool, policy)?.run(arrivals)?;
    tracing::info!(
        "Simulated {}: {} tasks, makespan {:?}, mean wait {:?}",
        report.policy,
        report.completed,
        report.makespan,
        report.mean_wait
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(at_ms: u64, cost_ms: u64) -> Arrival {
        Arrival {
            at: Duration::from_millis(at_ms),
            request: TaskRequest::new(Duration::from_millis(cost_ms)),
        }
    }

    #[test]
    fn test_single_worker_serializes_tasks() {
        let report = simulate(
            &PoolConfig::new(1),
            &PolicyConfig::new(PolicyKind::LeastConnections),
            vec![arrival(0, 100), arrival(0, 50), arrival(10, 30)],
        )
        .unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.makespan, Duration::from_millis(180));
        // waits: 0, 100, 140
        assert_eq!(report.max_wait, Duration::from_millis(140));
        assert_eq!(report.mean_wait, Duration::from_millis(80));
        assert_eq!(report.per_worker, vec![3]);
    }

    #[test]
    fn test_parallel_workers() {
        let report = simulate(
            &PoolConfig::new(2),
            &PolicyConfig::new(PolicyKind::LeastConnections),
            vec![arrival(0, 100), arrival(0, 100)],
        )
        .unwrap();
        assert_eq!(report.makespan, Duration::from_millis(100));
        assert_eq!(report.per_worker, vec![1, 1]);
        assert_eq!(report.max_wait, Duration::ZERO);
    }

    #[test]
    fn test_bookkeeping_released_per_task() {
        let mut sim = Simulation::new(
            &PoolConfig::new(1),
            &PolicyConfig::new(PolicyKind::LeastConnections),
        )
        .unwrap();
        let ids = sim
            .dispatcher
            .submit_all(vec![TaskRequest::new(Duration::from_millis(5)); 2])
            .unwrap();
        for &id in &ids {
            sim.arrived_at.insert(id, Duration::ZERO);
        }
        sim.schedule();
        assert_eq!(sim.arrived_at.len(), 1);
        assert_eq!(sim.assigned_at.len(), 1);

        sim.complete_next().unwrap();
        sim.complete_next().unwrap();
        assert!(sim.arrived_at.is_empty());
        assert!(sim.assigned_at.is_empty());
        assert!(sim.dispatcher.is_idle());
    }

    #[test]
    fn test_overcommitted_tasks_wait_for_lane() {
        // Round robin stacks two tasks on worker 0 of a two-worker pool.
        let report = simulate(
            &PoolConfig::new(2),
            &PolicyConfig::new(PolicyKind::RoundRobin),
            vec![arrival(0, 100), arrival(0, 10), arrival(0, 100)],
        )
        .unwrap();
        assert_eq!(report.peak_load.max, 2);
        assert_eq!(report.makespan, Duration::from_millis(200));
        let workers: Vec<WorkerId> = report.assignments.iter().map(|a| a.worker_id).collect();
        assert_eq!(workers, vec![0, 1, 0]);
    }

    #[test]
    fn test_priority_batch_order() {
        let mut arrivals = vec![arrival(0, 10), arrival(0, 10), arrival(0, 10)];
        arrivals[0].request.priority = Some(Priority::Low);
        arrivals[1].request.priority = Some(Priority::Medium);
        arrivals[2].request.priority = Some(Priority::High);
        let report = simulate(
            &PoolConfig::new(1),
            &PolicyConfig::new(PolicyKind::PriorityQueue),
            arrivals,
        )
        .unwrap();
        let order: Vec<TaskId> = report.assignments.iter().map(|a| a.task_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_workload_generation_is_seeded() {
        let workload = Workload {
            tasks: 20,
            keys: 4,
            prioritized: true,
            seed: Some(9),
            ..Workload::default()
        };
        let a = workload.generate().unwrap();
        assert_eq!(a, workload.generate().unwrap());
        assert_eq!(a.len(), 20);
        assert_eq!(a[3].at, Duration::from_millis(30));
        assert!(a.iter().all(|x| x.request.priority.is_some() && x.request.key.is_some()));
        assert!(a
            .iter()
            .all(|x| (20..=200).contains(&(x.request.cost.as_millis() as u64))));
    }

    #[test]
    fn test_inverted_cost_range_rejected() {
        let workload = Workload {
            min_cost_ms: 10,
            max_cost_ms: 5,
            ..Workload::default()
        };
        assert!(matches!(workload.generate(), Err(FanoutError::InvalidConfig(_))));
    }

    #[test]
    fn test_every_policy_completes_workload() {
        let arrivals = Workload {
            tasks: 60,
            interval_ms: 5,
            keys: 10,
            prioritized: true,
            seed: Some(3),
            ..Workload::default()
        }
        .generate()
        .unwrap();
        for kind in PolicyKind::ALL {
            let report = simulate(
                &PoolConfig::new(4).with_capacity(2),
                &PolicyConfig::new(kind).with_seed(3),
                arrivals.clone(),
            )
            .unwrap();
            assert_eq!(report.completed, 60, "policy {}", kind);
            assert_eq!(report.per_worker.iter().sum::<u64>(), 60);
        }
    }
}
