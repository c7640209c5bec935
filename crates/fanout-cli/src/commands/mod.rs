// crates/fanout-cli/src/commands/mod.rs
//
// Command module declarations for the fanout CLI.

pub mod compare;
pub mod ring;
pub mod simulate;
pub mod workload;
