// crates/fanout-runtime/src/unit.rs
//
// ExecutionUnit: the runtime side of one pool worker.
//
// Receives assign messages over an unbounded channel and runs each on its own
// tokio task, with a semaphore bounding concurrency to the worker's capacity.
// Tasks beyond capacity (possible under blind policies) wait for a permit.
// Every received assignment produces exactly one completion message, whether
// the executor succeeded or not.

use std::sync::Arc;

use fanout_core::error::{FanoutError, Result};
use fanout_core::{AssignMessage, CompletionMessage, WorkerId};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::executor::TaskExecutor;

pub struct ExecutionUnit {
    id: WorkerId,
    tx: mpsc::UnboundedSender<AssignMessage>,
    handle: JoinHandle<()>,
}

impl ExecutionUnit {
    /// Spawn the unit's receive loop.
    ///
    /// # Arguments
    /// * `capacity` - Maximum tasks executing at once (at least 1).
    /// * `completions` - Where completion messages are sent.
    pub fn spawn(
        id: WorkerId,
        capacity: usize,
        executor: Arc<dyn TaskExecutor>,
        completions: mpsc::UnboundedSender<CompletionMessage>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AssignMessage>();
        let semaphore = Arc::new(Semaphore::new(capacity.max(1)));

        let handle = tokio::spawn(async move {
            while let Some(assignment) = rx.recv().await {
                let received = Instant::now();
                let semaphore = semaphore.clone();
                let executor = executor.clone();
                let completions = completions.clone();

                tokio::spawn(async move {
                    let permit = semaphore.acquire_owned().await;
                    if permit.is_ok() {
                        if let Err(e) = executor.execute(&assignment).await {
                            tracing::error!(
                                "Worker {} failed task {}: {}",
                                id,
                                assignment.task_id,
                                e
                            );
                        }
                    } else {
                        tracing::error!(
                            "Worker {} semaphore closed, task {} not executed",
                            id,
                            assignment.task_id
                        );
                    }
                    let done = CompletionMessage {
                        task_id: assignment.task_id,
                        worker_id: id,
                        elapsed: received.elapsed(),
                    };
                    if completions.send(done).is_err() {
                        tracing::debug!(
                            "Worker {} completed task {} after orchestrator stopped",
                            id,
                            assignment.task_id
                        );
                    }
                    drop(permit);
                });
            }
            tracing::debug!("Execution unit {} stopped", id);
        });

        Self { id, tx, handle }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Hand an assignment to this unit.
    ///
    /// # Errors
    /// Returns `FanoutError::Runtime` if the unit has stopped.
    pub fn send(&self, assignment: AssignMessage) -> Result<()> {
        self.tx.send(assignment).map_err(|e| {
            FanoutError::Runtime(format!(
                "execution unit {} rejected task {}: channel closed",
                self.id, e.0.task_id
            ))
        })
    }

    /// Stop accepting assignments. Tasks already received still complete.
    pub fn stop(self) {
        drop(self.tx);
        drop(self.handle);
    }
}
