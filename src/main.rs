// Commonpool Simulator - Entry point
// Principle: Rules are chosen by the governed, not imposed on them

#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(unused_variables)]

mod agents;
mod cli;
mod governance;
mod server;
mod types;
mod voting;

#[cfg(test)]
mod tests;

use clap::Parser;
use cli::config::SimulationConfig;
use cli::runner::run_simulation;
use cli::{Cli, Commands, RunCmd};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_filter = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .init();

    // Execute command
    match cli.command {
        Commands::Run(cmd) => {
            print_banner();

            let config = load_config(&cmd).map_err(|e| {
                error!("Configuration error: {}", e);
                anyhow::anyhow!("Configuration error: {}", e)
            })?;

            if let Err(e) = run_simulation(config).await {
                error!("Simulation error: {}", e);
                return Err(anyhow::anyhow!("Simulation error: {}", e));
            }
        }

        Commands::Config { output } => {
            let config = SimulationConfig::default();
            match output {
                Some(path) => {
                    config.save(&path)?;
                    info!("Wrote default configuration to {}", path.display());
                }
                None => print!("{}", config.to_toml()?),
            }
        }
    }

    Ok(())
}

/// File (or defaults) first, then command line overrides
fn load_config(cmd: &RunCmd) -> Result<SimulationConfig, cli::config::ConfigError> {
    let base = match &cmd.config {
        Some(path) => {
            info!("📄 Loading configuration from {}", path.display());
            SimulationConfig::load(path)?
        }
        None => SimulationConfig::default(),
    };

    let config = base
        .with_seed(cmd.seed)
        .with_iterations(cmd.iterations)
        .with_turns(cmd.turns)
        .with_agents(cmd.agents, cmd.cheaters)
        .with_output(cmd.output.clone());
    config.validate()?;
    Ok(config)
}

/// Print the Commonpool banner
fn print_banner() {
    println!(r#"
    ╔═══════════════════════════════════════════════════════════╗
    ║                                                           ║
    ║                   C O M M O N P O O L                     ║
    ║                                                           ║
    ║          Contribute • Withdraw • Audit • Decide           ║
    ║                                                           ║
    ╚═══════════════════════════════════════════════════════════╝
    "#);
    println!("    Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}
