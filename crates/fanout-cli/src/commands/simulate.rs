// crates/fanout-cli/src/commands/simulate.rs
//
// `fanout simulate`: run one dispatch policy over a synthetic workload on a
// virtual clock and report timing and balance.

use clap::Args;
use fanout_core::{simulate, PolicyKind, SimulationReport};
use tabled::Tabled;

use super::workload::WorkloadArgs;
use crate::output::{format_json, format_table, millis, OutputFormat};

#[derive(Debug, Args)]
pub struct SimulateCmd {
    /// Dispatch policy to simulate.
    #[arg(long, default_value = "round-robin")]
    pub policy: PolicyKind,

    /// Also print the first N assignments.
    #[arg(long, default_value = "0")]
    pub show_assignments: usize,

    #[command(flatten)]
    pub workload: WorkloadArgs,
}

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    worker: usize,
    #[tabled(rename = "Completed")]
    completed: u64,
    #[tabled(rename = "Share")]
    share: String,
}

#[derive(Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Task")]
    task: u64,
    #[tabled(rename = "Worker")]
    worker: usize,
    #[tabled(rename = "At")]
    at: String,
}

/// Run the simulate command.
pub fn run(cmd: &SimulateCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let arrivals = cmd.workload.arrivals()?;
    let report = simulate(
        &cmd.workload.pool_config(),
        &cmd.workload.policy_config(cmd.policy),
        arrivals,
    )?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&report)),
        OutputFormat::Table => print_report(&report, cmd.show_assignments),
    }
    Ok(())
}

fn print_report(report: &SimulationReport, show_assignments: usize) {
    println!("Policy:     {}", report.policy);
    println!("Completed:  {}", report.completed);
    println!("Makespan:   {}", millis(report.makespan));
    println!("Mean wait:  {}", millis(report.mean_wait));
    println!("Max wait:   {}", millis(report.max_wait));
    println!(
        "Peak load:  max {} / min {} (std dev {:.2})",
        report.peak_load.max, report.peak_load.min, report.peak_load.std_dev
    );
    println!();

    let total = report.completed.max(1) as f64;
    let rows: Vec<WorkerRow> = report
        .per_worker
        .iter()
        .enumerate()
        .map(|(worker, &completed)| WorkerRow {
            worker,
            completed,
            share: format!("{:.1}%", completed as f64 / total * 100.0),
        })
        .collect();
    println!("{}", format_table(&rows));

    if show_assignments > 0 {
        let rows: Vec<AssignmentRow> = report
            .assignments
            .iter()
            .take(show_assignments)
            .map(|a| AssignmentRow {
                task: a.task_id,
                worker: a.worker_id,
                at: millis(a.at),
            })
            .collect();
        println!();
        println!("{}", format_table(&rows));
    }
}
