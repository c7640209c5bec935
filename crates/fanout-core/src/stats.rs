// crates/fanout-core/src/stats.rs
//
// Summary statistics over per-worker load vectors and dispatcher counters.

use serde::{Deserialize, Serialize};

/// Population statistics of a load vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub min: usize,
    pub max: usize,
}

impl LoadSummary {
    /// Summarize `loads`. An empty slice yields all zeros.
    pub fn from_loads(loads: &[usize]) -> Self {
        if loads.is_empty() {
            return Self::default();
        }
        let n = loads.len() as f64;
        let mean = loads.iter().sum::<usize>() as f64 / n;
        let variance = loads
            .iter()
            .map(|&l| {
                let d = l as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Self {
            mean,
            variance,
            std_dev: variance.sqrt(),
            min: loads.iter().copied().min().unwrap_or(0),
            max: loads.iter().copied().max().unwrap_or(0),
        }
    }

    /// Difference between the most and least loaded worker.
    pub fn spread(&self) -> usize {
        self.max - self.min
    }
}

/// Running counters kept by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub assigned: u64,
    pub completed: u64,
    /// Deepest the queue has been.
    pub max_queue_depth: usize,
}

impl DispatchStats {
    /// Tasks submitted but not yet completed.
    pub fn outstanding(&self) -> u64 {
        self.submitted - self.completed
    }
}
