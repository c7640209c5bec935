// crates/fanout-daemon/src/main.rs
//
// Binary entrypoint for the fanout daemon.
//
// Parses CLI arguments, loads configuration, initializes tracing, spawns the
// orchestrator and its execution units, runs the load generator, then drains
// outstanding work and reports the final pool state.

mod config;
mod generator;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use config::{expand_tilde, DaemonConfig};
use generator::{LoadGenerator, StopReason};
use serde::Serialize;
use tokio::sync::broadcast;

use fanout_core::{DispatchStats, Dispatcher, LoadSummary, PolicyKind, Worker};
use fanout_runtime::{DispatchEvent, Orchestrator, SleepExecutor};

/// fanout daemon: dispatches synthetic tasks over a pool of execution units.
#[derive(Parser, Debug)]
#[command(name = "fanout-daemon", version = "0.1.0", about = "fanout task distribution daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.fanout/config.toml")]
    config: String,

    /// Dispatch policy, overriding the config file (e.g. least-connections).
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Number of workers, overriding the config file.
    #[arg(long)]
    workers: Option<usize>,

    /// Number of tasks to submit (0 = until ctrl-c), overriding the config file.
    #[arg(long)]
    tasks: Option<u64>,

    /// Seed for the policy and the load generator.
    #[arg(long)]
    seed: Option<u64>,
}

/// Summary written to `report_path` at the end of a run.
#[derive(Debug, Serialize)]
struct RunReport {
    policy: PolicyKind,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: DispatchStats,
    load: LoadSummary,
    workers: Vec<Worker>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found. Logged once tracing is up.
    let loaded = DaemonConfig::load(&args.config);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    // CLI flags override config file values.
    if let Some(kind) = args.policy {
        daemon_config.policy.kind = kind;
    }
    if let Some(workers) = args.workers {
        daemon_config.pool.workers = workers;
    }
    if let Some(tasks) = args.tasks {
        daemon_config.load.total_tasks = tasks;
    }
    if let Some(seed) = args.seed {
        daemon_config.policy.seed = Some(seed);
        daemon_config.load.seed = Some(seed);
    }

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match &loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", args.config),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            args.config,
            e
        ),
    }

    if !daemon_config.pool.weights.is_empty()
        && daemon_config.pool.weights.len() != daemon_config.pool.workers
    {
        tracing::warn!(
            "Ignoring {} configured weights for {} workers",
            daemon_config.pool.weights.len(),
            daemon_config.pool.workers
        );
        daemon_config.pool.weights.clear();
    }
    daemon_config.validate()?;

    tracing::info!("fanout daemon v0.1.0");
    tracing::info!("Policy: {}", daemon_config.policy.kind);
    tracing::info!(
        "Workers: {} (capacity {})",
        daemon_config.pool.workers,
        daemon_config.pool.capacity
    );
    tracing::info!("Time scale: {}", daemon_config.time_scale);

    // ---------------------------------------------------------------
    // Orchestrator and execution units.
    // ---------------------------------------------------------------
    let dispatcher = Dispatcher::new(&daemon_config.pool, &daemon_config.policy)?
        .with_validation(daemon_config.validate);
    let executor = Arc::new(SleepExecutor::new(daemon_config.time_scale)?);
    let (handle, join) = Orchestrator::spawn(dispatcher, executor);
    let started_at = Utc::now();

    let logger = tokio::spawn(log_events(handle.subscribe()));

    // ---------------------------------------------------------------
    // Load generation.
    // ---------------------------------------------------------------
    let mut generator = LoadGenerator::new(daemon_config.load.clone());
    let reason = generator.run(&handle).await;
    tracing::info!(
        "Load generation finished ({:?}): {} tasks submitted",
        reason,
        generator.submitted()
    );

    if reason != StopReason::Interrupted {
        tracing::info!("Draining outstanding tasks (ctrl-c to stop immediately)");
        tokio::select! {
            result = handle.drain() => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted while draining");
            }
        }
    }

    // ---------------------------------------------------------------
    // Final report.
    // ---------------------------------------------------------------
    let workers = handle.snapshot().await?;
    let (stats, load) = handle.stats().await?;
    for w in &workers {
        tracing::info!(
            "Worker {}: completed={}, active={}, weight={}",
            w.id,
            w.completed,
            w.active_count,
            w.weight
        );
    }
    tracing::info!(
        "Submitted={}, assigned={}, completed={}, max queue depth={}",
        stats.submitted,
        stats.assigned,
        stats.completed,
        stats.max_queue_depth
    );

    if let Some(path) = &daemon_config.report_path {
        let report = RunReport {
            policy: daemon_config.policy.kind,
            started_at,
            finished_at: Utc::now(),
            stats,
            load,
            workers,
        };
        let path = expand_tilde(path);
        if let Some(parent) = Path::new(&path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!("Wrote run report to {}", path);
    }

    handle.shutdown().await?;
    join.await?;
    logger.abort();
    Ok(())
}

/// Log dispatch events until the orchestrator goes away.
async fn log_events(mut events: broadcast::Receiver<DispatchEvent>) {
    loop {
        match events.recv().await {
            Ok(DispatchEvent::Queued {
                task_id, priority, ..
            }) => {
                tracing::debug!("Task {} queued (priority {:?})", task_id, priority);
            }
            Ok(DispatchEvent::Assigned {
                task_id, worker_id, ..
            }) => {
                tracing::debug!("Task {} -> worker {}", task_id, worker_id);
            }
            Ok(DispatchEvent::Completed {
                task_id,
                worker_id,
                elapsed,
                ..
            }) => {
                tracing::info!(
                    "Task {} completed on worker {} in {:?}",
                    task_id,
                    worker_id,
                    elapsed
                );
            }
            Ok(DispatchEvent::Rebalanced {
                moved, total_keys, ..
            }) => {
                tracing::info!("Ring rebalanced: {}/{} keys moved", moved, total_keys);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event logger lagged, skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
