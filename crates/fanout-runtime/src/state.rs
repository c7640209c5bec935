// crates/fanout-runtime/src/state.rs
//
// Lifecycle state machine for the orchestrator.
//
// Valid transitions:
//   Starting -> Running -> Draining -> Running
//   Any state -> Stopped

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    /// Execution units are being spawned.
    Starting,
    /// Accepting submissions.
    Running,
    /// Waiting for queued and in-flight work to finish; submissions rejected.
    Draining,
    /// Event loop has exited.
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeState::Starting => write!(f, "Starting"),
            RuntimeState::Running => write!(f, "Running"),
            RuntimeState::Draining => write!(f, "Draining"),
            RuntimeState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// State machine for managing orchestrator lifecycle transitions.
#[derive(Debug)]
pub struct RuntimeStateMachine {
    pub current: RuntimeState,
}

impl RuntimeStateMachine {
    /// Create a new state machine in the Starting state.
    pub fn new() -> Self {
        Self {
            current: RuntimeState::Starting,
        }
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns an error if the transition is not valid.
    pub fn transition(&mut self, new_state: RuntimeState) -> Result<(), String> {
        let valid = match (self.current, new_state) {
            (_, RuntimeState::Stopped) => true,
            (RuntimeState::Starting, RuntimeState::Running) => true,
            (RuntimeState::Running, RuntimeState::Draining) => true,
            (RuntimeState::Draining, RuntimeState::Running) => true,
            _ => false,
        };

        if valid {
            tracing::info!("Runtime state: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(format!(
                "Invalid state transition: {} -> {}",
                self.current, new_state
            ))
        }
    }

    /// Whether new submissions are accepted.
    pub fn accepts_work(&self) -> bool {
        self.current == RuntimeState::Running
    }
}

impl Default for RuntimeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
