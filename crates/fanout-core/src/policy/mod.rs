// crates/fanout-core/src/policy/mod.rs
//
// Dispatch policy variants and the factory that builds them from config.

pub mod consistent_hash;
pub mod least_connections;
pub mod power_of_two;
pub mod priority;
pub mod random;
pub mod response_time;
pub mod round_robin;
pub mod weighted_round_robin;

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::error::{FanoutError, Result};
use crate::pool::WorkerPool;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

pub use consistent_hash::ConsistentHashPolicy;
pub use least_connections::LeastConnectionsPolicy;
pub use power_of_two::PowerOfTwoChoicesPolicy;
pub use priority::PriorityQueuePolicy;
pub use random::RandomPolicy;
pub use response_time::ResponseTimePolicy;
pub use round_robin::RoundRobinPolicy;
pub use weighted_round_robin::WeightedRoundRobinPolicy;

/// Names of the available dispatch policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    PriorityQueue,
    #[default]
    RoundRobin,
    LeastConnections,
    ConsistentHash,
    PowerOfTwoChoices,
    WeightedRoundRobin,
    ResponseTime,
    Random,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 8] = [
        PolicyKind::PriorityQueue,
        PolicyKind::RoundRobin,
        PolicyKind::LeastConnections,
        PolicyKind::ConsistentHash,
        PolicyKind::PowerOfTwoChoices,
        PolicyKind::WeightedRoundRobin,
        PolicyKind::ResponseTime,
        PolicyKind::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::PriorityQueue => "priority-queue",
            PolicyKind::RoundRobin => "round-robin",
            PolicyKind::LeastConnections => "least-connections",
            PolicyKind::ConsistentHash => "consistent-hash",
            PolicyKind::PowerOfTwoChoices => "power-of-two-choices",
            PolicyKind::WeightedRoundRobin => "weighted-round-robin",
            PolicyKind::ResponseTime => "response-time",
            PolicyKind::Random => "random",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = FanoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        PolicyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| FanoutError::InvalidPolicy(s.to_string()))
    }
}

/// A change to the set of workers a sharding policy routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    /// Put a pool worker (back) on the ring.
    AddWorker(WorkerId),
    /// Take a pool worker off the ring; its keys move to their next owners.
    RemoveWorker(WorkerId),
    /// Change the virtual-node count and rebuild the ring.
    SetVirtualNodes(u32),
}

/// Build the policy named by `config` for `pool`.
pub fn build(config: &PolicyConfig, pool: &WorkerPool) -> Result<Box<dyn DispatchPolicy>> {
    config.validate()?;
    let policy: Box<dyn DispatchPolicy> = match config.kind {
        PolicyKind::PriorityQueue => Box::new(PriorityQueuePolicy::new()),
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new()),
        PolicyKind::LeastConnections => Box::new(LeastConnectionsPolicy::new()),
        PolicyKind::ConsistentHash => Box::new(ConsistentHashPolicy::new(
            pool.len(),
            config.virtual_nodes,
        )?),
        PolicyKind::PowerOfTwoChoices => {
            Box::new(PowerOfTwoChoicesPolicy::new(seeded_rng(config.seed)))
        }
        PolicyKind::WeightedRoundRobin => Box::new(WeightedRoundRobinPolicy::new()),
        PolicyKind::ResponseTime => Box::new(ResponseTimePolicy::new()),
        PolicyKind::Random => Box::new(RandomPolicy::new(seeded_rng(config.seed))),
    };
    tracing::debug!("Built dispatch policy {}", config.kind);
    Ok(policy)
}

/// Deterministic generator when a seed is given, entropy-seeded otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
