// crates/fanout-cli/src/commands/compare.rs
//
// `fanout compare`: run several dispatch policies over the same workload and
// tabulate the results side by side.

use clap::Args;
use fanout_core::{simulate, LoadSummary, PolicyKind, SimulationReport};
use tabled::Tabled;

use super::workload::WorkloadArgs;
use crate::output::{format_json, format_table, millis, OutputFormat};

#[derive(Debug, Args)]
pub struct CompareCmd {
    /// Comma-separated policies to compare (default: all).
    #[arg(long, value_delimiter = ',')]
    pub policies: Vec<PolicyKind>,

    #[command(flatten)]
    pub workload: WorkloadArgs,
}

#[derive(Tabled)]
struct CompareRow {
    #[tabled(rename = "Policy")]
    policy: String,
    #[tabled(rename = "Makespan")]
    makespan: String,
    #[tabled(rename = "Mean wait")]
    mean_wait: String,
    #[tabled(rename = "Max wait")]
    max_wait: String,
    #[tabled(rename = "Peak load")]
    peak: usize,
    #[tabled(rename = "Completions std dev")]
    spread: String,
}

impl From<&SimulationReport> for CompareRow {
    fn from(report: &SimulationReport) -> Self {
        let per_worker: Vec<usize> = report.per_worker.iter().map(|&c| c as usize).collect();
        Self {
            policy: report.policy.to_string(),
            makespan: millis(report.makespan),
            mean_wait: millis(report.mean_wait),
            max_wait: millis(report.max_wait),
            peak: report.peak_load.max,
            spread: format!("{:.2}", LoadSummary::from_loads(&per_worker).std_dev),
        }
    }
}

/// Run the compare command.
pub fn run(cmd: &CompareCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let policies: Vec<PolicyKind> = if cmd.policies.is_empty() {
        PolicyKind::ALL.to_vec()
    } else {
        cmd.policies.clone()
    };
    let arrivals = cmd.workload.arrivals()?;
    let pool = cmd.workload.pool_config();

    let reports = policies
        .iter()
        .map(|&kind| simulate(&pool, &cmd.workload.policy_config(kind), arrivals.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&reports)),
        OutputFormat::Table => {
            println!(
                "{} tasks over {} workers (capacity {})",
                cmd.workload.tasks, cmd.workload.workers, cmd.workload.capacity
            );
            println!();
            let rows: Vec<CompareRow> = reports.iter().map(CompareRow::from).collect();
            println!("{}", format_table(&rows));
        }
    }
    Ok(())
}
