// crates/fanout-runtime/src/orchestrator.rs
//
// Orchestrator: one tokio task that owns the Dispatcher.
//
// Callers talk to it through a cloneable OrchestratorHandle over a bounded
// command channel, each command carrying a oneshot for its reply. Execution
// units report completions over an unbounded channel. The event loop handles
// one message at a time, so all dispatcher state is mutated from this task
// only and never locked.

use std::sync::Arc;

use chrono::Utc;
use fanout_core::error::{FanoutError, Result};
use fanout_core::{
    CompletionMessage, DispatchStats, Dispatcher, LoadSummary, MembershipChange, RebalanceReport,
    TaskId, TaskRequest, TaskState, Worker,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::events::DispatchEvent;
use crate::executor::TaskExecutor;
use crate::state::{RuntimeState, RuntimeStateMachine};
use crate::unit::ExecutionUnit;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

enum Command {
    Submit {
        request: TaskRequest,
        reply: oneshot::Sender<Result<TaskId>>,
    },
    SubmitAll {
        requests: Vec<TaskRequest>,
        reply: oneshot::Sender<Result<Vec<TaskId>>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Worker>>,
    },
    Stats {
        reply: oneshot::Sender<(DispatchStats, LoadSummary)>,
    },
    TaskState {
        task_id: TaskId,
        reply: oneshot::Sender<Option<TaskState>>,
    },
    Membership {
        change: MembershipChange,
        reply: oneshot::Sender<Result<RebalanceReport>>,
    },
    State {
        reply: oneshot::Sender<RuntimeState>,
    },
    Drain {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owner of the dispatcher and the execution units.
pub struct Orchestrator {
    dispatcher: Dispatcher,
    units: Vec<ExecutionUnit>,
    commands: mpsc::Receiver<Command>,
    completions: mpsc::UnboundedReceiver<CompletionMessage>,
    events: broadcast::Sender<DispatchEvent>,
    state: RuntimeStateMachine,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl Orchestrator {
    /// Spawn one execution unit per pool worker and the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        dispatcher: Dispatcher,
        executor: Arc<dyn TaskExecutor>,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let mut state = RuntimeStateMachine::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let units = dispatcher
            .pool_snapshot()
            .iter()
            .map(|w| ExecutionUnit::spawn(w.id, w.capacity, executor.clone(), completion_tx.clone()))
            .collect::<Vec<_>>();
        tracing::info!(
            "Spawned {} execution units for policy {}",
            units.len(),
            dispatcher.policy_kind()
        );
        if let Err(e) = state.transition(RuntimeState::Running) {
            tracing::warn!("{}", e);
        }

        let orchestrator = Orchestrator {
            dispatcher,
            units,
            commands: command_rx,
            completions: completion_rx,
            events: event_tx.clone(),
            state,
            drain_waiters: Vec::new(),
        };
        let join = tokio::spawn(orchestrator.run());
        let handle = OrchestratorHandle {
            commands: command_tx,
            events: event_tx,
        };
        (handle, join)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("All orchestrator handles dropped, stopping");
                        break;
                    }
                },
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }
            }
        }
        self.stop();
    }

    /// Returns false when the loop should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Submit { request, reply } => {
                let result = self.submit(vec![request]).and_then(|ids| {
                    ids.first()
                        .copied()
                        .ok_or_else(|| FanoutError::Runtime("submission produced no id".into()))
                });
                let _ = reply.send(result);
            }
            Command::SubmitAll { requests, reply } => {
                let _ = reply.send(self.submit(requests));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.dispatcher.pool_snapshot());
            }
            Command::Stats { reply } => {
                let _ = reply.send((self.dispatcher.stats(), self.dispatcher.load_summary()));
            }
            Command::TaskState { task_id, reply } => {
                let _ = reply.send(self.dispatcher.task_state(task_id));
            }
            Command::Membership { change, reply } => {
                let result = self.dispatcher.membership(change);
                if let Ok(report) = &result {
                    self.emit(DispatchEvent::Rebalanced {
                        moved: report.moved_count(),
                        total_keys: report.total_keys,
                        at: Utc::now(),
                    });
                    self.flush();
                }
                let _ = reply.send(result);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state.current);
            }
            Command::Drain { reply } => {
                if self.dispatcher.is_idle() {
                    let _ = reply.send(());
                } else {
                    if self.state.current == RuntimeState::Running {
                        if let Err(e) = self.state.transition(RuntimeState::Draining) {
                            tracing::warn!("{}", e);
                        }
                    }
                    self.drain_waiters.push(reply);
                }
            }
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn submit(&mut self, requests: Vec<TaskRequest>) -> Result<Vec<TaskId>> {
        if !self.state.accepts_work() {
            return Err(FanoutError::InvalidState(format!(
                "orchestrator is {}, not accepting tasks",
                self.state.current
            )));
        }
        let priorities: Vec<_> = requests.iter().map(|r| r.priority).collect();
        let ids = self.dispatcher.submit_all(requests)?;
        let now = Utc::now();
        for (&task_id, priority) in ids.iter().zip(priorities) {
            self.emit(DispatchEvent::Queued {
                task_id,
                priority,
                at: now,
            });
        }
        self.flush();
        Ok(ids)
    }

    fn handle_completion(&mut self, completion: CompletionMessage) {
        match self.dispatcher.on_worker_complete(completion) {
            Ok(_) => {
                self.emit(DispatchEvent::Completed {
                    task_id: completion.task_id,
                    worker_id: completion.worker_id,
                    elapsed: completion.elapsed,
                    at: Utc::now(),
                });
                self.flush();
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring completion of task {} from worker {}: {}",
                    completion.task_id,
                    completion.worker_id,
                    e
                );
            }
        }
        if self.dispatcher.is_idle() && !self.drain_waiters.is_empty() {
            tracing::info!("Drained: no queued or in-flight tasks");
            for waiter in self.drain_waiters.drain(..) {
                let _ = waiter.send(());
            }
            if self.state.current == RuntimeState::Draining {
                if let Err(e) = self.state.transition(RuntimeState::Running) {
                    tracing::warn!("{}", e);
                }
            }
        }
    }

    /// Forward new assignments to their execution units.
    fn flush(&mut self) {
        for assignment in self.dispatcher.take_assignments() {
            let (task_id, worker_id) = (assignment.task_id, assignment.worker_id);
            let sent = match self.units.get(worker_id) {
                Some(unit) => unit.send(assignment),
                None => Err(FanoutError::UnknownWorker(worker_id)),
            };
            match sent {
                Ok(()) => self.emit(DispatchEvent::Assigned {
                    task_id,
                    worker_id,
                    at: Utc::now(),
                }),
                Err(e) => tracing::error!("Could not deliver task {}: {}", task_id, e),
            }
        }
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn stop(&mut self) {
        if self.state.current == RuntimeState::Stopped {
            return;
        }
        for unit in self.units.drain(..) {
            unit.stop();
        }
        self.drain_waiters.clear();
        if let Err(e) = self.state.transition(RuntimeState::Stopped) {
            tracing::warn!("{}", e);
        }
        let stats = self.dispatcher.stats();
        tracing::info!(
            "Orchestrator stopped: submitted={}, completed={}, queued={}, in_flight={}",
            stats.submitted,
            stats.completed,
            self.dispatcher.queue_len(),
            self.dispatcher.in_flight()
        );
    }
}

/// Cloneable handle for submitting work to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<DispatchEvent>,
}

impl OrchestratorHandle {
    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, request: TaskRequest) -> Result<TaskId> {
        self.request(|reply| Command::Submit { request, reply }).await?
    }

    /// Submit a batch that is queued in full before any of it is dispatched.
    pub async fn submit_all(&self, requests: Vec<TaskRequest>) -> Result<Vec<TaskId>> {
        self.request(|reply| Command::SubmitAll { requests, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<Vec<Worker>> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Dispatcher counters and a summary of current worker loads.
    pub async fn stats(&self) -> Result<(DispatchStats, LoadSummary)> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn task_state(&self, task_id: TaskId) -> Result<Option<TaskState>> {
        self.request(|reply| Command::TaskState { task_id, reply })
            .await
    }

    pub async fn membership(&self, change: MembershipChange) -> Result<RebalanceReport> {
        self.request(|reply| Command::Membership { change, reply })
            .await?
    }

    pub async fn state(&self) -> Result<RuntimeState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Resolve once nothing is queued or in flight. Submissions are rejected
    /// until then.
    pub async fn drain(&self) -> Result<()> {
        self.request(|reply| Command::Drain { reply }).await
    }

    /// Stop the event loop and the execution units.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T, F>(&self, make: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| FanoutError::Runtime("orchestrator has stopped".to_string()))?;
        rx.await
            .map_err(|_| FanoutError::Runtime("orchestrator dropped the request".to_string()))
    }
}
