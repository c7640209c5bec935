// crates/fanout-daemon/src/config.rs
//
// Runtime configuration for the fanout daemon.
// Loaded from a TOML file or populated with sensible defaults.

use std::fs;

use fanout_core::error::FanoutError;
use fanout_core::{PolicyConfig, PoolConfig};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Worker pool shape (`[pool]` table).
    #[serde(default)]
    pub pool: PoolConfig,

    /// Dispatch policy (`[policy]` table).
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Synthetic load (`[load]` table).
    #[serde(default)]
    pub load: LoadConfig,

    /// Multiplier applied to task costs when sleeping. 0 runs tasks instantly.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Re-check dispatcher invariants after every operation.
    #[serde(default)]
    pub validate: bool,

    /// Where to write the end-of-run JSON report. Unset disables the report.
    #[serde(default)]
    pub report_path: Option<String>,
}

/// Shape of the generated workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Delay between submissions.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_min_cost_ms")]
    pub min_cost_ms: u64,

    #[serde(default = "default_max_cost_ms")]
    pub max_cost_ms: u64,

    /// Number of tasks to submit. 0 runs until interrupted.
    #[serde(default = "default_total_tasks")]
    pub total_tasks: u64,

    /// Distinct routing keys to draw from. 0 leaves tasks unkeyed.
    #[serde(default)]
    pub keys: usize,

    /// Seed for costs, priorities and keys. Unset means seed from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    50
}

fn default_min_cost_ms() -> u64 {
    20
}

fn default_max_cost_ms() -> u64 {
    200
}

fn default_total_tasks() -> u64 {
    200
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_cost_ms: default_min_cost_ms(),
            max_cost_ms: default_max_cost_ms(),
            total_tasks: default_total_tasks(),
            keys: 0,
            seed: None,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            policy: PolicyConfig::default(),
            load: LoadConfig::default(),
            time_scale: default_time_scale(),
            log_level: default_log_level(),
            validate: false,
            report_path: None,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// A leading `~/` is expanded to the home directory.
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(expand_tilde(path))?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check every section for values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), FanoutError> {
        self.pool.validate()?;
        self.policy.validate()?;
        if self.load.min_cost_ms > self.load.max_cost_ms {
            return Err(FanoutError::InvalidConfig(format!(
                "load.min_cost_ms ({}) exceeds load.max_cost_ms ({})",
                self.load.min_cost_ms, self.load.max_cost_ms
            )));
        }
        if self.load.total_tasks == 0 && self.load.interval_ms == 0 {
            return Err(FanoutError::InvalidConfig(
                "unlimited load needs load.interval_ms > 0".to_string(),
            ));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(FanoutError::InvalidConfig(format!(
                "time_scale must be a non-negative number, got {}",
                self.time_scale
            )));
        }
        Ok(())
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &path[1..]);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::PolicyKind;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.policy.kind, PolicyKind::RoundRobin);
        assert_eq!(config.load, LoadConfig::default());
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            time_scale = 0.5
            validate = true

            [pool]
            workers = 3
            capacity = 2
            weights = [3, 1, 1]

            [policy]
            kind = "power-of-two-choices"
            seed = 7

            [load]
            interval_ms = 10
            total_tasks = 0
            keys = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.workers, 3);
        assert_eq!(config.pool.weights, vec![3, 1, 1]);
        assert_eq!(config.policy.kind, PolicyKind::PowerOfTwoChoices);
        assert_eq!(config.policy.seed, Some(7));
        assert_eq!(config.policy.virtual_nodes, 10);
        assert_eq!(config.load.total_tasks, 0);
        assert_eq!(config.load.min_cost_ms, 20);
        assert!(config.validate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let parsed: Result<DaemonConfig, _> = toml::from_str("[policy]\nkind = \"fastest\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = DaemonConfig::default();
        config.load.min_cost_ms = 500;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.load.total_tasks = 0;
        config.load.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.time_scale = -1.0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.pool.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/etc/fanout.toml"), "/etc/fanout.toml");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde("~/.fanout/config.toml"),
                format!("{}/.fanout/config.toml", home.display())
            );
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(DaemonConfig::load("/nonexistent/fanout/config.toml").is_err());
    }
}
