// crates/fanout-cli/src/commands/ring.rs
//
// `fanout ring`: experiment with the consistent-hash ring.
//
//   fanout ring assign --nodes a,b,c alpha beta   key placement and ownership
//   fanout ring churn --nodes 8 --keys 10000       keys moved per membership change

use clap::{Args, Subcommand};
use fanout_core::policy::seeded_rng;
use fanout_core::{HashRing, KeyAssignment, RingCommand, RingReply};
use rand::Rng;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{format_json, format_table, percent, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum RingCmd {
    /// Place keys on a ring and show which node owns each.
    Assign(AssignArgs),
    /// Measure how many keys move when each node leaves or a new one joins.
    Churn(ChurnArgs),
}

#[derive(Debug, Args)]
pub struct AssignArgs {
    /// Comma-separated node ids.
    #[arg(long, value_delimiter = ',', default_value = "A,B,C")]
    pub nodes: Vec<String>,

    #[arg(long, default_value = "5")]
    pub virtual_nodes: u32,

    /// Node to remove after the initial placement.
    #[arg(long)]
    pub remove: Option<String>,

    /// Keys to place.
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ChurnArgs {
    /// Number of nodes on the ring.
    #[arg(long, default_value = "8")]
    pub nodes: usize,

    /// Number of random keys to place.
    #[arg(long, default_value = "10000")]
    pub keys: usize,

    #[arg(long, default_value = "10")]
    pub virtual_nodes: u32,

    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Tabled, Serialize)]
struct KeyRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "After removal")]
    after: String,
}

#[derive(Tabled, Serialize)]
struct OwnershipRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Hash space")]
    share: String,
}

#[derive(Serialize)]
struct AssignOutput {
    keys: Vec<KeyRow>,
    ownership: Vec<OwnershipRow>,
}

#[derive(Tabled, Serialize)]
struct ChurnRow {
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Keys moved")]
    moved: usize,
    #[tabled(rename = "Fraction")]
    fraction: String,
    #[tabled(rename = "Expected")]
    expected: usize,
}

/// Run a ring subcommand.
pub fn run(cmd: &RingCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        RingCmd::Assign(args) => assign(args, format),
        RingCmd::Churn(args) => churn(args, format),
    }
}

fn assign(args: &AssignArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut ring = HashRing::with_nodes(args.virtual_nodes, args.nodes.iter().cloned())?;
    let mut placed: Vec<KeyAssignment> = Vec::new();
    for key in &args.keys {
        ring.apply(RingCommand::AssignKey(key.clone()))?;
        if let Some(assignment) = ring.key(key) {
            placed.push(assignment.clone());
        }
    }
    let ownership: Vec<OwnershipRow> = ring
        .ownership()
        .into_iter()
        .map(|(node, share)| OwnershipRow {
            node,
            share: percent(share),
        })
        .collect();

    if let Some(node) = &args.remove {
        ring.try_remove_node(node)?;
    }
    let rows: Vec<KeyRow> = placed
        .iter()
        .map(|a| KeyRow {
            key: a.id.clone(),
            hash: format!("{:#010x}", a.hash),
            node: a.assigned_node_id.clone().unwrap_or_else(|| "-".to_string()),
            after: ring
                .key(&a.id)
                .and_then(|k| k.assigned_node_id.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let output = AssignOutput {
                keys: rows,
                ownership,
            };
            println!("{}", format_json(&output));
        }
        OutputFormat::Table => {
            println!("{}", format_table(&rows));
            println!();
            println!("{}", format_table(&ownership));
        }
    }
    Ok(())
}

fn churn(args: &ChurnArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let nodes: Vec<String> = (0..args.nodes).map(|i| format!("node-{}", i)).collect();
    let mut ring = HashRing::with_nodes(args.virtual_nodes, nodes.iter().cloned())?;
    let mut rng = seeded_rng(args.seed);
    for _ in 0..args.keys {
        let key: String = (0..16).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
        ring.assign_key(&key);
    }
    let total = ring.keys().count();

    let mut commands: Vec<RingCommand> = nodes
        .iter()
        .map(|n| RingCommand::RemoveNode(n.clone()))
        .collect();
    commands.push(RingCommand::AddNode(format!("node-{}", args.nodes)));

    let mut rows = Vec::with_capacity(commands.len());
    for command in commands {
        let (change, expected) = match &command {
            RingCommand::RemoveNode(n) => (format!("remove {}", n), total / args.nodes.max(1)),
            RingCommand::AddNode(n) => (format!("add {}", n), total / (args.nodes + 1)),
            other => (format!("{:?}", other), 0),
        };
        let mut trial = ring.clone();
        if let RingReply::Rebalanced(report) = trial.apply(command)? {
            rows.push(ChurnRow {
                change,
                moved: report.moved_count(),
                fraction: percent(report.moved_fraction()),
                expected,
            });
        }
    }

    match format {
        OutputFormat::Json => println!("{}", format_json(&rows)),
        OutputFormat::Table => {
            println!(
                "{} keys over {} nodes, {} virtual nodes each",
                total, args.nodes, args.virtual_nodes
            );
            println!();
            println!("{}", format_table(&rows));
        }
    }
    Ok(())
}
