// crates/fanout-core/src/load.rs
//
// Per-worker load signals read by the load-aware dispatch policies.
//
// The primary signal is the active-task count. Completions per worker and an
// exponential moving average of reported latency are tracked alongside it for
// the response-time policy and for reporting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FanoutError, Result};
use crate::worker::WorkerId;

/// Smoothing factor for the latency EMA.
pub const LATENCY_EMA_ALPHA: f64 = 0.3;

/// Tracks load signals for a fixed set of workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSampler {
    active: Vec<usize>,
    completed: Vec<u64>,
    /// EMA of completion latency in milliseconds; `None` until the first sample.
    latency_ema_ms: Vec<Option<f64>>,
}

impl LoadSampler {
    /// Create a sampler for `workers` workers, all at zero load.
    pub fn new(workers: usize) -> Self {
        Self {
            active: vec![0; workers],
            completed: vec![0; workers],
            latency_ema_ms: vec![None; workers],
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Record one more in-flight task on `worker`.
    pub fn increment(&mut self, worker: WorkerId) -> Result<()> {
        let slot = self
            .active
            .get_mut(worker)
            .ok_or(FanoutError::UnknownWorker(worker))?;
        *slot += 1;
        Ok(())
    }

    /// Record one fewer in-flight task on `worker`.
    ///
    /// # Errors
    /// `UnknownWorker` for an invalid id, `InvalidState` if the worker already
    /// has no active tasks.
    pub fn decrement(&mut self, worker: WorkerId) -> Result<()> {
        let slot = self
            .active
            .get_mut(worker)
            .ok_or(FanoutError::UnknownWorker(worker))?;
        if *slot == 0 {
            return Err(FanoutError::InvalidState(format!(
                "worker {} has no active tasks to release",
                worker
            )));
        }
        *slot -= 1;
        Ok(())
    }

    /// Count a completion and fold its latency into the worker's EMA.
    pub fn record_completion(&mut self, worker: WorkerId, latency: Duration) -> Result<()> {
        let count = self
            .completed
            .get_mut(worker)
            .ok_or(FanoutError::UnknownWorker(worker))?;
        *count += 1;

        let sample = latency.as_secs_f64() * 1000.0;
        let ema = &mut self.latency_ema_ms[worker];
        *ema = Some(match *ema {
            None => sample,
            Some(prev) => LATENCY_EMA_ALPHA * sample + (1.0 - LATENCY_EMA_ALPHA) * prev,
        });
        Ok(())
    }

    /// Active-task count of `worker` (0 for unknown ids).
    pub fn active(&self, worker: WorkerId) -> usize {
        self.active.get(worker).copied().unwrap_or(0)
    }

    pub fn completed(&self, worker: WorkerId) -> u64 {
        self.completed.get(worker).copied().unwrap_or(0)
    }

    /// Latency EMA of `worker` in milliseconds, if any completion was recorded.
    pub fn latency_ema_ms(&self, worker: WorkerId) -> Option<f64> {
        self.latency_ema_ms.get(worker).copied().flatten()
    }

    /// Active-task counts of all workers, in worker order.
    pub fn loads(&self) -> &[usize] {
        &self.active
    }

    /// Sum of active-task counts over all workers.
    pub fn total_active(&self) -> usize {
        self.active.iter().sum()
    }
}
