// crates/fanout-daemon/src/generator.rs
//
// Synthetic load generator for the fanout daemon.
//
// Submits one task per interval with a uniformly drawn cost, priority and
// (optionally) routing key, until the task budget is spent or ctrl-c.

use std::time::Duration;

use fanout_core::policy::seeded_rng;
use fanout_core::{Priority, TaskRequest};
use fanout_runtime::OrchestratorHandle;
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::LoadConfig;

/// Why the generator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BudgetReached,
    Interrupted,
    Rejected,
}

pub struct LoadGenerator {
    config: LoadConfig,
    rng: StdRng,
    submitted: u64,
}

impl LoadGenerator {
    pub fn new(config: LoadConfig) -> Self {
        let rng = seeded_rng(config.seed);
        Self {
            config,
            rng,
            submitted: 0,
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    fn budget_reached(&self) -> bool {
        self.config.total_tasks > 0 && self.submitted >= self.config.total_tasks
    }

    /// Draw the next synthetic task.
    pub fn next_request(&mut self) -> TaskRequest {
        let cost = self
            .rng
            .gen_range(self.config.min_cost_ms..=self.config.max_cost_ms);
        let priority = Priority::ALL[self.rng.gen_range(0..Priority::ALL.len())];
        let mut request =
            TaskRequest::new(Duration::from_millis(cost)).with_priority(priority);
        if self.config.keys > 0 {
            request = request.with_key(format!("key-{}", self.rng.gen_range(0..self.config.keys)));
        }
        request
    }

    /// Run the generator loop against a live orchestrator.
    pub async fn run(&mut self, handle: &OrchestratorHandle) -> StopReason {
        tracing::info!(
            "Load generator started (interval={}ms, cost={}..={}ms, budget={})",
            self.config.interval_ms,
            self.config.min_cost_ms,
            self.config.max_cost_ms,
            if self.config.total_tasks == 0 {
                "unlimited".to_string()
            } else {
                self.config.total_tasks.to_string()
            }
        );

        let interval = Duration::from_millis(self.config.interval_ms);
        loop {
            if self.budget_reached() {
                return StopReason::BudgetReached;
            }
            let request = self.next_request();
            if let Err(e) = handle.submit(request).await {
                tracing::warn!("Submission rejected, stopping load generator: {}", e);
                return StopReason::Rejected;
            }
            self.submitted += 1;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Load generator received shutdown signal");
                    return StopReason::Interrupted;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
