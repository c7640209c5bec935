// crates/fanout-runtime/src/executor.rs
//
// The seam between the orchestrator and the actual workload.

use std::time::Duration;

use async_trait::async_trait;
use fanout_core::error::{FanoutError, Result};
use fanout_core::AssignMessage;

/// Runs the work behind one assignment.
///
/// Implementations may fail; the execution unit logs the failure and still
/// reports the task as completed.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, assignment: &AssignMessage) -> Result<()>;
}

/// Executor that sleeps for the task's declared cost, scaled by `time_scale`.
#[derive(Debug, Clone, Copy)]
pub struct SleepExecutor {
    time_scale: f64,
}

impl SleepExecutor {
    /// # Errors
    /// Returns `FanoutError::InvalidConfig` unless `time_scale` is finite and
    /// non-negative.
    pub fn new(time_scale: f64) -> Result<Self> {
        if !time_scale.is_finite() || time_scale < 0.0 {
            return Err(FanoutError::InvalidConfig(format!(
                "time_scale must be a non-negative number, got {}",
                time_scale
            )));
        }
        Ok(Self { time_scale })
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Wall-clock time spent on a task of the given cost.
    pub fn scaled(&self, cost: Duration) -> Duration {
        cost.mul_f64(self.time_scale)
    }
}

impl Default for SleepExecutor {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

#[async_trait]
impl TaskExecutor for SleepExecutor {
    async fn execute(&self, assignment: &AssignMessage) -> Result<()> {
        tokio::time::sleep(self.scaled(assignment.cost)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_cost() {
        let exec = SleepExecutor::new(0.5).unwrap();
        assert_eq!(exec.scaled(Duration::from_millis(100)), Duration::from_millis(50));
        assert_eq!(SleepExecutor::default().time_scale(), 1.0);
    }

    #[test]
    fn test_rejects_bad_scale() {
        assert!(SleepExecutor::new(-1.0).is_err());
        assert!(SleepExecutor::new(f64::NAN).is_err());
        assert!(SleepExecutor::new(0.0).is_ok());
    }

    #[tokio::test]
    async fn test_sleep_executor_runs() {
        let exec = SleepExecutor::new(0.0).unwrap();
        let msg = AssignMessage {
            task_id: 1,
            worker_id: 0,
            cost: Duration::from_secs(10),
            payload: serde_json::Value::Null,
        };
        exec.execute(&msg).await.unwrap();
    }
}
