// crates/fanout-core/src/config.rs
//
// Pool and policy configuration shared by the daemon and the CLI.
// Deserializable from TOML tables with per-field defaults.

use serde::{Deserialize, Serialize};

use crate::error::{FanoutError, Result};
use crate::policy::PolicyKind;
use crate::ring::DEFAULT_VIRTUAL_NODES;

/// Shape of the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers (execution units).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Concurrent tasks each worker accepts under capacity-checked policies.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Per-worker weights for weighted round robin. Empty means all 1.
    #[serde(default)]
    pub weights: Vec<u32>,
}

fn default_workers() -> usize {
    4
}

fn default_capacity() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
            weights: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// A pool of `workers` workers with unit capacity and weight.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_weights(mut self, weights: Vec<u32>) -> Self {
        self.weights = weights;
        self
    }

    /// Weight of each worker, filling in 1 when no weights were configured.
    pub fn resolved_weights(&self) -> Vec<u32> {
        if self.weights.is_empty() {
            vec![1; self.workers]
        } else {
            self.weights.clone()
        }
    }

    /// Check the configuration for values the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FanoutError::InvalidConfig(
                "pool must have at least one worker".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(FanoutError::InvalidConfig(
                "worker capacity must be > 0".to_string(),
            ));
        }
        if !self.weights.is_empty() {
            if self.weights.len() != self.workers {
                return Err(FanoutError::InvalidConfig(format!(
                    "expected {} weights, got {}",
                    self.workers,
                    self.weights.len()
                )));
            }
            if self.weights.iter().any(|&w| w == 0) {
                return Err(FanoutError::InvalidConfig(
                    "worker weights must be >= 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Which dispatch policy to run and its tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub kind: PolicyKind,

    /// Virtual nodes per worker on the consistent-hash ring.
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: u32,

    /// Seed for randomized policies. Unset means seed from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_virtual_nodes() -> u32 {
    DEFAULT_VIRTUAL_NODES
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            virtual_nodes: default_virtual_nodes(),
            seed: None,
        }
    }
}

impl PolicyConfig {
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_virtual_nodes(mut self, virtual_nodes: u32) -> Self {
        self.virtual_nodes = virtual_nodes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.virtual_nodes == 0 {
            return Err(FanoutError::InvalidConfig(
                "virtual node count must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
