// crates/fanout-core/src/error.rs

use thiserror::Error;

use crate::task::TaskId;
use crate::worker::WorkerId;

/// Error type shared by every crate in the fanout workspace.
///
/// All errors are local and synchronous: they are returned to the caller at
/// the point of the offending call and never retried internally. An empty
/// hash ring is not an error; lookups simply return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FanoutError {
    /// The operation referenced a worker id that is not in the pool.
    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// The operation referenced a task id that is not queued or in flight.
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    /// A capacity-checked assignment targeted a full worker.
    #[error("Worker {worker_id} is at capacity ({capacity})")]
    WorkerAtCapacity { worker_id: WorkerId, capacity: usize },

    /// A release named a task the worker is not holding.
    #[error("Worker {worker_id} does not hold task {task_id}")]
    TaskNotHeld { worker_id: WorkerId, task_id: TaskId },

    /// Strict ring insertion of a node id that is already present.
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Strict ring removal of a node id that is not present.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A priority string outside HIGH / MEDIUM / LOW.
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// A dispatch policy name that does not match any known policy.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Pool, policy, or runtime configuration rejected during validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The active policy does not support the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A bookkeeping invariant was found broken.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Runtime plumbing failure (closed channel, stopped orchestrator).
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FanoutError>;
