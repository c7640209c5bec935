// crates/fanout-core/src/dispatcher.rs
//
// Dispatcher: the orchestration loop over queue, pool and policy.
//
// Tasks move Queued -> Assigned -> Completed and never go back. Every
// submission and every completion triggers an assignment pass that keeps
// pulling from the queue until the policy declines or, for capacity-checked
// policies, no worker has room. Assign messages accumulate in an outbox that
// the owner drains with `take_assignments()` and forwards to execution units.
//
// The dispatcher is synchronous and owned by a single thread; the async
// runtime wraps it in one tokio task.

use std::collections::HashMap;

use crate::config::{PolicyConfig, PoolConfig};
use crate::error::{FanoutError, Result};
use crate::policy::{self, MembershipChange, PolicyKind};
use crate::pool::{Admission, WorkerPool};
use crate::queue::TaskQueue;
use crate::ring::{HashRing, RebalanceReport};
use crate::stats::{DispatchStats, LoadSummary};
use crate::task::{Task, TaskId, TaskRequest, TaskState};
use crate::traits::DispatchPolicy;
use crate::worker::{AssignMessage, CompletionMessage, Worker, WorkerId};

pub struct Dispatcher {
    pool: WorkerPool,
    queue: TaskQueue,
    policy: Box<dyn DispatchPolicy>,
    /// State of every task that is queued or in flight.
    tasks: HashMap<TaskId, TaskState>,
    next_task_id: TaskId,
    next_submit_order: u64,
    outbox: Vec<AssignMessage>,
    stats: DispatchStats,
    validate: bool,
}

impl Dispatcher {
    /// Build a pool and policy from configuration.
    ///
    /// # Errors
    /// Returns `FanoutError::InvalidConfig` if either config fails validation.
    pub fn new(pool: &PoolConfig, policy: &PolicyConfig) -> Result<Self> {
        let pool = WorkerPool::new(pool)?;
        let policy = policy::build(policy, &pool)?;
        Ok(Self::with_policy(pool, policy))
    }

    /// Assemble a dispatcher from an existing pool and policy.
    pub fn with_policy(pool: WorkerPool, policy: Box<dyn DispatchPolicy>) -> Self {
        let queue = TaskQueue::new(policy.queue_order());
        tracing::info!(
            "Dispatcher ready: policy={}, workers={}",
            policy.kind(),
            pool.len()
        );
        Self {
            pool,
            queue,
            policy,
            tasks: HashMap::new(),
            next_task_id: 1,
            next_submit_order: 0,
            outbox: Vec::new(),
            stats: DispatchStats::default(),
            validate: false,
        }
    }

    /// Re-check bookkeeping invariants after every mutation.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Submit one task and run an assignment pass.
    ///
    /// # Returns
    /// The id assigned to the new task.
    pub fn submit(&mut self, request: TaskRequest) -> Result<TaskId> {
        let id = self.enqueue(request);
        self.check()?;
        self.try_assign()?;
        Ok(id)
    }

    /// Queue every request first, then run a single assignment pass.
    ///
    /// With a priority queue this lets a whole batch be ordered before any of
    /// it is dispatched.
    pub fn submit_all<I>(&mut self, requests: I) -> Result<Vec<TaskId>>
    where
        I: IntoIterator<Item = TaskRequest>,
    {
        let ids: Vec<TaskId> = requests.into_iter().map(|r| self.enqueue(r)).collect();
        self.check()?;
        self.try_assign()?;
        Ok(ids)
    }

    /// Assign queued tasks while the policy yields workers.
    ///
    /// # Returns
    /// The number of assignments made in this pass.
    pub fn try_assign(&mut self) -> Result<usize> {
        let admission = self.policy.admission();
        let mut assigned = 0;

        while let Some(next) = self.queue.peek() {
            if admission == Admission::Capacity && !self.pool.has_spare_capacity() {
                break;
            }
            let Some(worker) = self.policy.select(next, &self.pool) else {
                break;
            };
            self.pool.check_assignable(worker, admission)?;

            let task = self
                .queue
                .pop()
                .ok_or_else(|| FanoutError::InvalidState("queue emptied during dispatch".into()))?;
            let message = self.pool.assign_with(worker, &task, admission)?;
            self.tasks
                .insert(task.id, TaskState::Assigned { worker_id: worker });
            self.stats.assigned += 1;
            self.outbox.push(message);
            assigned += 1;
            self.check()?;
        }

        Ok(assigned)
    }

    /// Handle a completion signal from an execution unit.
    ///
    /// Releases the worker, records the latency, marks the task completed and
    /// runs another assignment pass. A completion for a task the worker does
    /// not hold (unknown, still queued, held elsewhere, or already completed)
    /// is rejected without changing any state.
    ///
    /// # Returns
    /// The number of queued tasks assigned as a result.
    pub fn on_worker_complete(&mut self, completion: CompletionMessage) -> Result<usize> {
        let CompletionMessage {
            task_id,
            worker_id,
            elapsed,
        } = completion;
        if worker_id >= self.pool.len() {
            return Err(FanoutError::UnknownWorker(worker_id));
        }
        match self.tasks.get(&task_id) {
            Some(TaskState::Assigned { worker_id: holder }) if *holder == worker_id => {}
            Some(_) => return Err(FanoutError::TaskNotHeld { worker_id, task_id }),
            None => return Err(FanoutError::UnknownTask(task_id)),
        }

        self.pool.release(worker_id, task_id)?;
        self.pool.record_completion(worker_id, elapsed)?;
        self.tasks.remove(&task_id);
        self.stats.completed += 1;
        tracing::debug!(
            "Task {} completed on worker {} in {:?}",
            task_id,
            worker_id,
            elapsed
        );
        self.check()?;
        self.try_assign()
    }

    /// Drain the assign messages produced since the last call.
    pub fn take_assignments(&mut self) -> Vec<AssignMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Lifecycle state of `task_id`, or `None` if no such id was issued.
    pub fn task_state(&self, task_id: TaskId) -> Option<TaskState> {
        match self.tasks.get(&task_id) {
            Some(state) => Some(*state),
            None if task_id >= 1 && task_id < self.next_task_id => Some(TaskState::Completed),
            None => None,
        }
    }

    /// Read-only view of every worker.
    pub fn pool_snapshot(&self) -> Vec<Worker> {
        self.pool.snapshot()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Queued tasks in the order they would be dispatched.
    pub fn queued_tasks(&self) -> Vec<Task> {
        self.queue.tasks_in_order()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// True when nothing is queued and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.pool.in_flight() == 0
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Summary of the current active counts.
    pub fn load_summary(&self) -> LoadSummary {
        LoadSummary::from_loads(self.pool.load().loads())
    }

    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// The policy's hash ring, if it shards by key.
    pub fn ring(&self) -> Option<&HashRing> {
        self.policy.ring()
    }

    /// Put `worker` (back) on the consistent-hash ring.
    pub fn add_node(&mut self, worker: WorkerId) -> Result<RebalanceReport> {
        self.membership(MembershipChange::AddWorker(worker))
    }

    /// Take `worker` off the consistent-hash ring. Tasks it already holds
    /// run to completion; new keys it owned go to their next owners.
    pub fn remove_node(&mut self, worker: WorkerId) -> Result<RebalanceReport> {
        self.membership(MembershipChange::RemoveWorker(worker))
    }

    pub fn set_virtual_node_count(&mut self, virtual_nodes: u32) -> Result<RebalanceReport> {
        self.membership(MembershipChange::SetVirtualNodes(virtual_nodes))
    }

    /// Apply a membership change to the policy and retry queued work, which
    /// may have been waiting on an empty ring.
    ///
    /// # Errors
    /// `FanoutError::Unsupported` for policies that do not shard by key.
    pub fn membership(&mut self, change: MembershipChange) -> Result<RebalanceReport> {
        let report = self.policy.membership(change, &self.pool)?;
        self.check()?;
        self.try_assign()?;
        Ok(report)
    }

    /// Check the bookkeeping invariants.
    ///
    /// Every tracked task is either queued and held by no worker, or held by
    /// exactly the worker recorded for it; active counts sum to the in-flight
    /// total; ring entries are sorted by hash.
    pub fn verify(&self) -> Result<()> {
        if self.pool.load().total_active() != self.pool.in_flight() {
            return Err(FanoutError::InvalidState(format!(
                "active counts sum to {} but {} tasks are in flight",
                self.pool.load().total_active(),
                self.pool.in_flight()
            )));
        }
        if self.queue.len() + self.pool.in_flight() != self.tasks.len() {
            return Err(FanoutError::InvalidState(format!(
                "{} queued + {} in flight != {} tracked tasks",
                self.queue.len(),
                self.pool.in_flight(),
                self.tasks.len()
            )));
        }
        for (&id, state) in &self.tasks {
            let holder = self.pool.holder_of(id);
            let queued = self.queue.contains(id);
            let ok = match state {
                TaskState::Queued => queued && holder.is_none(),
                TaskState::Assigned { worker_id } => !queued && holder == Some(*worker_id),
                TaskState::Completed => false,
            };
            if !ok {
                return Err(FanoutError::InvalidState(format!(
                    "task {} is {} but queued={} holder={:?}",
                    id, state, queued, holder
                )));
            }
        }
        if let Some(ring) = self.policy.ring() {
            if ring.entries().windows(2).any(|w| w[0].hash > w[1].hash) {
                return Err(FanoutError::InvalidState("ring entries out of order".into()));
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, request: TaskRequest) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        let order = self.next_submit_order;
        self.next_submit_order += 1;

        let task = Task::from_request(id, order, request);
        tracing::debug!(
            "Task {} queued (priority {:?}, cost {:?})",
            id,
            task.priority,
            task.cost
        );
        self.queue.push(task);
        self.tasks.insert(id, TaskState::Queued);
        self.stats.submitted += 1;
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.queue.len());
        id
    }

    fn check(&self) -> Result<()> {
        if self.validate {
            self.verify()
        } else {
            Ok(())
        }
    }
}
