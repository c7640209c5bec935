// crates/fanout-core/src/worker.rs
//
// Worker snapshot type and the messages exchanged with execution units.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Stable worker identifier: the worker's index in pool-creation order.
pub type WorkerId = usize;

/// Read-only view of a worker, as returned by `poolSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    /// True while the worker holds at least one task.
    pub busy: bool,
    /// Most recently assigned task still held by the worker.
    pub current_task_id: Option<TaskId>,
    /// Number of tasks currently assigned to the worker.
    pub active_count: usize,
    /// Concurrent tasks the worker accepts under capacity-checked policies.
    pub capacity: usize,
    /// Static weight used by weighted round robin.
    pub weight: u32,
    /// Tasks completed by this worker so far.
    pub completed: u64,
}

impl Worker {
    pub fn has_spare_capacity(&self) -> bool {
        self.active_count < self.capacity
    }
}

/// Sent to an execution unit once per assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignMessage {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub cost: Duration,
    pub payload: serde_json::Value,
}

/// Sent by an execution unit exactly once, after it finishes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    /// Wall time the unit spent on the task; feeds the latency signal.
    pub elapsed: Duration,
}
