// crates/fanout-runtime/src/events.rs
//
// Events broadcast by the orchestrator as tasks move through their lifecycle.
//
// Subscribers get them from `OrchestratorHandle::subscribe()`. A slow
// subscriber that falls behind the broadcast buffer loses the oldest events;
// the orchestrator never waits on subscribers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fanout_core::{Priority, TaskId, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// A task entered the queue.
    Queued {
        task_id: TaskId,
        priority: Option<Priority>,
        at: DateTime<Utc>,
    },
    /// A task was handed to a worker.
    Assigned {
        task_id: TaskId,
        worker_id: WorkerId,
        at: DateTime<Utc>,
    },
    /// A worker reported a task finished.
    Completed {
        task_id: TaskId,
        worker_id: WorkerId,
        /// Time from assignment receipt to completion, as measured by the unit.
        elapsed: Duration,
        at: DateTime<Utc>,
    },
    /// Ring membership changed.
    Rebalanced {
        moved: usize,
        total_keys: usize,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            DispatchEvent::Queued { task_id, .. }
            | DispatchEvent::Assigned { task_id, .. }
            | DispatchEvent::Completed { task_id, .. } => Some(*task_id),
            DispatchEvent::Rebalanced { .. } => None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::Queued { at, .. }
            | DispatchEvent::Assigned { at, .. }
            | DispatchEvent::Completed { at, .. }
            | DispatchEvent::Rebalanced { at, .. } => *at,
        }
    }
}
