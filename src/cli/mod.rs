// CLI - Command Line Interface for the Commonpool simulator
// Principle: Simple, clear, composable commands

pub mod config;
pub mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Commonpool - Teams, a shared pool, and the rules they live by
#[derive(Parser, Debug)]
#[command(name = "commonpool-sim")]
#[command(author = "Commonpool Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn-based simulation of team governance over a common pool")]
#[command(long_about = r#"
Commonpool runs agents in teams that contribute to and withdraw from a shared
pool under an Articles of Association they vote on every iteration.

Run with defaults:
  commonpool-sim run

Reproducible run exported to JSON:
  commonpool-sim run --seed 42 --output turns.json

Write a configuration file to edit:
  commonpool-sim config --output sim.toml
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "COMMONPOOL_LOG")]
    pub log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation
    Run(RunCmd),

    /// Print or write the default configuration
    Config {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run a simulation
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// TOML configuration file
    #[arg(short, long, env = "COMMONPOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Master seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of iterations
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Turns per iteration
    #[arg(long)]
    pub turns: Option<u32>,

    /// Number of honest agents
    #[arg(long)]
    pub agents: Option<usize>,

    /// Number of cheating agents
    #[arg(long)]
    pub cheaters: Option<usize>,

    /// Export recorded turns as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
