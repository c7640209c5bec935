// crates/fanout-core/src/task.rs
//
// Task model: what callers submit, what the dispatcher tracks, and the
// per-task lifecycle Queued -> Assigned -> Completed.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FanoutError;
use crate::worker::WorkerId;

/// Monotonic, unique task identifier assigned at submission.
pub type TaskId = u64;

/// Scheduling priority of a task.
///
/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Numeric tier used for queue ordering. An absent priority ranks below
    /// `Low`.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            Some(Priority::High) => 3,
            Some(Priority::Medium) => 2,
            Some(Priority::Low) => 1,
            None => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

impl FromStr for Priority {
    type Err = FanoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(FanoutError::InvalidPriority(s.to_string())),
        }
    }
}

/// A unit of work as submitted by a caller, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Optional priority; only the priority-queue policy looks at it.
    pub priority: Option<Priority>,
    /// Declared execution cost of the task.
    pub cost: Duration,
    /// Routing key for consistent-hash dispatch. Defaults to the task id.
    pub key: Option<String>,
    /// Opaque payload forwarded untouched to the execution unit.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskRequest {
    /// A request with the given cost, no priority, no key, and a null payload.
    pub fn new(cost: Duration) -> Self {
        Self {
            priority: None,
            cost,
            key: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A submitted task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub priority: Option<Priority>,
    pub cost: Duration,
    /// Position in submission order; the tie-break among equal priorities.
    pub submit_order: u64,
    pub key: Option<String>,
    pub payload: serde_json::Value,
}

impl Task {
    /// Materialise a request into a task with its identity fixed.
    pub fn from_request(id: TaskId, submit_order: u64, request: TaskRequest) -> Self {
        Self {
            id,
            priority: request.priority,
            cost: request.cost,
            submit_order,
            key: request.key,
            payload: request.payload,
        }
    }

    /// The key used for consistent-hash routing: the explicit key if one was
    /// given, otherwise the task id rendered as text.
    pub fn routing_key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => self.id.to_string(),
        }
    }
}

/// Lifecycle state of a task.
///
/// A task never re-enters `Queued` once it has been assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Assigned { worker_id: WorkerId },
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Queued => write!(f, "Queued"),
            TaskState::Assigned { worker_id } => write!(f, "Assigned(worker {})", worker_id),
            TaskState::Completed => write!(f, "Completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::rank(Some(Priority::Low)) > Priority::rank(None));
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" medium ".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
    }

    #[test]
    fn test_priority_parse_rejects_unknown() {
        let err = "urgent".parse::<Priority>().unwrap_err();
        assert_eq!(err, FanoutError::InvalidPriority("urgent".to_string()));
    }

    #[test]
    fn test_routing_key_defaults_to_id() {
        let task = Task::from_request(42, 0, TaskRequest::new(Duration::from_millis(5)));
        assert_eq!(task.routing_key(), "42");

        let keyed = Task::from_request(
            43,
            1,
            TaskRequest::new(Duration::from_millis(5)).with_key("user-7"),
        );
        assert_eq!(keyed.routing_key(), "user-7");
    }
}
