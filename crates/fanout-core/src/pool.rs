// crates/fanout-core/src/pool.rs
//
// WorkerPool: a fixed-size set of execution slots.
//
// The pool records which tasks each worker holds and keeps the LoadSampler in
// step with those holdings, so that the active count summed over all workers
// always equals the number of in-flight tasks. Workers are created once and
// never destroyed while the pool is alive.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PoolConfig;
use crate::error::{FanoutError, Result};
use crate::load::LoadSampler;
use crate::task::{Task, TaskId};
use crate::worker::{AssignMessage, Worker, WorkerId};

/// How an assignment treats worker capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Only workers with spare capacity may receive a task; otherwise the
    /// task stays queued.
    Capacity,
    /// The selected worker always receives the task, even past capacity.
    Blind,
}

#[derive(Debug, Clone)]
struct WorkerSlot {
    capacity: usize,
    weight: u32,
    /// Held tasks in assignment order.
    held: Vec<TaskId>,
}

/// Fixed-size collection of workers with busy/idle bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    load: LoadSampler,
}

impl WorkerPool {
    /// Build a pool from configuration.
    ///
    /// # Errors
    /// Returns `FanoutError::InvalidConfig` if the configuration fails
    /// validation.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let slots = config
            .resolved_weights()
            .into_iter()
            .map(|weight| WorkerSlot {
                capacity: config.capacity,
                weight,
                held: Vec::new(),
            })
            .collect();
        Ok(Self {
            slots,
            load: LoadSampler::new(config.workers),
        })
    }

    /// Shorthand for a pool of `workers` workers with uniform `capacity`.
    pub fn with_workers(workers: usize, capacity: usize) -> Result<Self> {
        Self::new(&PoolConfig::new(workers).with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn load(&self) -> &LoadSampler {
        &self.load
    }

    /// Static weight of `worker` (0 for unknown ids).
    pub fn weight(&self, worker: WorkerId) -> u32 {
        self.slots.get(worker).map(|s| s.weight).unwrap_or(0)
    }

    pub fn weights(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.weight).collect()
    }

    pub fn capacity(&self, worker: WorkerId) -> Result<usize> {
        self.slot(worker).map(|s| s.capacity)
    }

    /// True if `worker` exists and holds fewer tasks than its capacity.
    pub fn has_spare(&self, worker: WorkerId) -> bool {
        self.slots
            .get(worker)
            .map(|s| s.held.len() < s.capacity)
            .unwrap_or(false)
    }

    /// True if any worker has spare capacity.
    pub fn has_spare_capacity(&self) -> bool {
        self.slots.iter().any(|s| s.held.len() < s.capacity)
    }

    /// Workers with spare capacity, in pool-creation order.
    pub fn idle_workers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.held.len() < s.capacity)
            .map(|(id, _)| id)
    }

    /// Check that `worker` may receive a task under `admission`, without
    /// changing anything.
    pub fn check_assignable(&self, worker: WorkerId, admission: Admission) -> Result<()> {
        let slot = self.slot(worker)?;
        if admission == Admission::Capacity && slot.held.len() >= slot.capacity {
            return Err(FanoutError::WorkerAtCapacity {
                worker_id: worker,
                capacity: slot.capacity,
            });
        }
        Ok(())
    }

    /// Assign `task` to `worker`, which must have spare capacity.
    ///
    /// Marks the worker busy, records the task as its current task and bumps
    /// its active count. Returns the message for the execution unit.
    pub fn assign(&mut self, worker: WorkerId, task: &Task) -> Result<AssignMessage> {
        self.assign_with(worker, task, Admission::Capacity)
    }

    /// Assign `task` to `worker` regardless of capacity.
    pub fn assign_overcommit(&mut self, worker: WorkerId, task: &Task) -> Result<AssignMessage> {
        self.assign_with(worker, task, Admission::Blind)
    }

    /// Assign under an explicit admission mode.
    pub fn assign_with(
        &mut self,
        worker: WorkerId,
        task: &Task,
        admission: Admission,
    ) -> Result<AssignMessage> {
        self.check_assignable(worker, admission)?;
        if let Some(holder) = self.holder_of(task.id) {
            return Err(FanoutError::InvalidState(format!(
                "task {} is already held by worker {}",
                task.id, holder
            )));
        }
        self.load.increment(worker)?;
        let slot = self.slot_mut(worker)?;
        slot.held.push(task.id);
        tracing::debug!(
            "Assigned task {} to worker {} (active {})",
            task.id,
            worker,
            slot.held.len()
        );
        Ok(AssignMessage {
            task_id: task.id,
            worker_id: worker,
            cost: task.cost,
            payload: task.payload.clone(),
        })
    }

    /// Release `task_id` from `worker` after completion.
    ///
    /// # Errors
    /// `UnknownWorker` for an invalid id; `TaskNotHeld` if the worker is not
    /// holding the task (for example a duplicate completion).
    pub fn release(&mut self, worker: WorkerId, task_id: TaskId) -> Result<()> {
        let slot = self.slot_mut(worker)?;
        let pos = slot
            .held
            .iter()
            .position(|&t| t == task_id)
            .ok_or(FanoutError::TaskNotHeld {
                worker_id: worker,
                task_id,
            })?;
        slot.held.remove(pos);
        self.load.decrement(worker)?;
        tracing::debug!(
            "Released task {} from worker {} (active {})",
            task_id,
            worker,
            self.load.active(worker)
        );
        Ok(())
    }

    /// Feed a completion latency into the worker's load signals.
    pub fn record_completion(&mut self, worker: WorkerId, latency: Duration) -> Result<()> {
        self.load.record_completion(worker, latency)
    }

    /// The worker currently holding `task_id`, if any.
    pub fn holder_of(&self, task_id: TaskId) -> Option<WorkerId> {
        self.slots.iter().position(|s| s.held.contains(&task_id))
    }

    /// Tasks held by `worker`, in assignment order.
    pub fn held_tasks(&self, worker: WorkerId) -> Result<&[TaskId]> {
        self.slot(worker).map(|s| s.held.as_slice())
    }

    /// Total number of tasks held across all workers.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().map(|s| s.held.len()).sum()
    }

    /// Snapshot of one worker.
    pub fn worker(&self, worker: WorkerId) -> Result<Worker> {
        let slot = self.slot(worker)?;
        Ok(Worker {
            id: worker,
            busy: !slot.held.is_empty(),
            current_task_id: slot.held.last().copied(),
            active_count: self.load.active(worker),
            capacity: slot.capacity,
            weight: slot.weight,
            completed: self.load.completed(worker),
        })
    }

    /// Snapshot of every worker, in pool-creation order.
    pub fn snapshot(&self) -> Vec<Worker> {
        (0..self.slots.len())
            .filter_map(|id| self.worker(id).ok())
            .collect()
    }

    fn slot(&self, worker: WorkerId) -> Result<&WorkerSlot> {
        self.slots
            .get(worker)
            .ok_or(FanoutError::UnknownWorker(worker))
    }

    fn slot_mut(&mut self, worker: WorkerId) -> Result<&mut WorkerSlot> {
        self.slots
            .get_mut(worker)
            .ok_or(FanoutError::UnknownWorker(worker))
    }
}
