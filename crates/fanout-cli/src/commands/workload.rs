// crates/fanout-cli/src/commands/workload.rs
//
// Pool and workload flags shared by `simulate` and `compare`.

use clap::Args;
use fanout_core::simulation::Arrival;
use fanout_core::{FanoutError, PolicyConfig, PolicyKind, PoolConfig, Workload};

#[derive(Debug, Clone, Args)]
pub struct WorkloadArgs {
    /// Number of workers in the pool.
    #[arg(long, default_value = "4")]
    pub workers: usize,

    /// Concurrent tasks per worker.
    #[arg(long, default_value = "1")]
    pub capacity: usize,

    /// Comma-separated worker weights for weighted round robin.
    #[arg(long, value_delimiter = ',')]
    pub weights: Vec<u32>,

    /// Number of tasks to submit.
    #[arg(long, default_value = "100")]
    pub tasks: usize,

    /// Gap between arrivals in milliseconds (0 submits one batch).
    #[arg(long, default_value = "10")]
    pub interval_ms: u64,

    #[arg(long, default_value = "20")]
    pub min_cost_ms: u64,

    #[arg(long, default_value = "200")]
    pub max_cost_ms: u64,

    /// Distinct routing keys (0 = unkeyed tasks).
    #[arg(long, default_value = "0")]
    pub keys: usize,

    /// Give every task a random priority.
    #[arg(long)]
    pub prioritized: bool,

    /// Virtual nodes per worker for consistent hashing.
    #[arg(long, default_value = "10")]
    pub virtual_nodes: u32,

    /// Seed for the workload and randomized policies.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl WorkloadArgs {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.workers)
            .with_capacity(self.capacity)
            .with_weights(self.weights.clone())
    }

    pub fn policy_config(&self, kind: PolicyKind) -> PolicyConfig {
        let mut config = PolicyConfig::new(kind).with_virtual_nodes(self.virtual_nodes);
        config.seed = self.seed;
        config
    }

    pub fn arrivals(&self) -> Result<Vec<Arrival>, FanoutError> {
        Workload {
            tasks: self.tasks,
            interval_ms: self.interval_ms,
            min_cost_ms: self.min_cost_ms,
            max_cost_ms: self.max_cost_ms,
            keys: self.keys,
            prioritized: self.prioritized,
            seed: self.seed,
        }
        .generate()
    }
}
