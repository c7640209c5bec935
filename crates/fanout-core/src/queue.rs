// crates/fanout-core/src/queue.rs
//
// Holding area for tasks awaiting assignment.
//
// FIFO order for most policies; for priority dispatch a binary heap keyed by
// (priority descending, submit order ascending), which keeps equal-priority
// tasks in submission order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::task::{Priority, Task, TaskId};

/// Order in which queued tasks are handed to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueOrder {
    Fifo,
    Priority,
}

#[derive(Debug, Clone)]
struct PriorityEntry(Task);

impl PriorityEntry {
    fn key(&self) -> (u8, std::cmp::Reverse<u64>) {
        (
            Priority::rank(self.0.priority),
            std::cmp::Reverse(self.0.submit_order),
        )
    }
}

impl PartialEq for PriorityEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PriorityEntry {}

impl PartialOrd for PriorityEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Clone)]
enum Backing {
    Fifo(VecDeque<Task>),
    Priority(BinaryHeap<PriorityEntry>),
}

/// Ordered queue of tasks waiting for a worker.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    backing: Backing,
}

impl TaskQueue {
    pub fn new(order: QueueOrder) -> Self {
        let backing = match order {
            QueueOrder::Fifo => Backing::Fifo(VecDeque::new()),
            QueueOrder::Priority => Backing::Priority(BinaryHeap::new()),
        };
        Self { backing }
    }

    pub fn order(&self) -> QueueOrder {
        match self.backing {
            Backing::Fifo(_) => QueueOrder::Fifo,
            Backing::Priority(_) => QueueOrder::Priority,
        }
    }

    pub fn push(&mut self, task: Task) {
        match &mut self.backing {
            Backing::Fifo(q) => q.push_back(task),
            Backing::Priority(h) => h.push(PriorityEntry(task)),
        }
    }

    /// The task that would be dispatched next.
    pub fn peek(&self) -> Option<&Task> {
        match &self.backing {
            Backing::Fifo(q) => q.front(),
            Backing::Priority(h) => h.peek().map(|e| &e.0),
        }
    }

    pub fn pop(&mut self) -> Option<Task> {
        match &mut self.backing {
            Backing::Fifo(q) => q.pop_front(),
            Backing::Priority(h) => h.pop().map(|e| e.0),
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Fifo(q) => q.len(),
            Backing::Priority(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        match &self.backing {
            Backing::Fifo(q) => q.iter().any(|t| t.id == task_id),
            Backing::Priority(h) => h.iter().any(|e| e.0.id == task_id),
        }
    }

    /// Clone of the queued tasks in dispatch order.
    pub fn tasks_in_order(&self) -> Vec<Task> {
        match &self.backing {
            Backing::Fifo(q) => q.iter().cloned().collect(),
            Backing::Priority(h) => {
                let mut entries: Vec<PriorityEntry> = h.iter().cloned().collect();
                entries.sort_by(|a, b| b.cmp(a));
                entries.into_iter().map(|e| e.0).collect()
            }
        }
    }
}
