// crates/fanout-core/src/lib.rs
//
// fanout-core: Task distribution over a fixed pool of parallel executors.
//
// This is the leaf crate of the workspace. It holds the data model (tasks,
// workers, ring entries), the hash ring, load sampling, the task queue, the
// worker pool, the pluggable dispatch policies and the synchronous dispatcher
// that ties them together. Nothing here is async; the runtime crate wraps the
// dispatcher in a tokio task.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hash;
pub mod load;
pub mod policy;
pub mod pool;
pub mod queue;
pub mod ring;
pub mod simulation;
pub mod stats;
pub mod task;
pub mod traits;
pub mod worker;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use fanout_core::Dispatcher;`

// Data model
pub use task::{Priority, Task, TaskId, TaskRequest, TaskState};
pub use worker::{AssignMessage, CompletionMessage, Worker, WorkerId};

// Ring
pub use ring::{HashRing, KeyAssignment, RebalanceReport, RingCommand, RingEntry, RingReply};

// Dispatch
pub use dispatcher::Dispatcher;
pub use policy::{MembershipChange, PolicyKind};
pub use pool::{Admission, WorkerPool};
pub use queue::{QueueOrder, TaskQueue};

// Config and stats
pub use config::{PolicyConfig, PoolConfig};
pub use stats::{DispatchStats, LoadSummary};

// Simulation
pub use simulation::{simulate, Arrival, Simulation, SimulationReport, Workload};

// Error type
pub use error::FanoutError;

// Traits
pub use traits::DispatchPolicy;
