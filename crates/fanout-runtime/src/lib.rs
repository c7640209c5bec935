// crates/fanout-runtime/src/lib.rs
//
// fanout-runtime: Async execution layer for the fanout dispatcher.
//
// A single tokio task owns the Dispatcher and serializes every submission,
// completion and membership change. Execution units are tokio tasks that
// receive assign messages and answer with exactly one completion each.

pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod state;
pub mod unit;

pub use events::DispatchEvent;
pub use executor::{SleepExecutor, TaskExecutor};
pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use state::{RuntimeState, RuntimeStateMachine};
pub use unit::ExecutionUnit;
