// Runner - Simulation execution and graceful shutdown
// Principle: The simulation is synchronous; the runtime only supervises it
//
// The environment runs on a blocking task. Ctrl-C flips a shared flag that the
// environment checks between turns, so an interrupted run still exports every
// turn it finished.

use crate::agents::{Agent, AgentDecisionSource, Cheater, Honest, Roster};
use crate::cli::config::{ConfigError, SimulationConfig};
use crate::server::{Environment, MemoryRecorder, RecorderError, RunOutcome, SimulationError};
use crate::types::AgentId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Run the simulation with the given configuration
pub async fn run_simulation(config: SimulationConfig) -> Result<RunOutcome, RunnerError> {
    config.validate()?;

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!("🚀 Starting simulation (seed {})", seed);
    info!(
        "👥 {} honest, {} cheaters, teams of {}",
        config.honest_agents, config.cheater_agents, config.team_size
    );
    info!(
        "⏱️  {} iterations x {} turns",
        config.iterations, config.turns_per_iteration
    );

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();
    let worker_config = config.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        simulate(&worker_config, seed, &worker_stop)
    });

    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = signal::ctrl_c() => {
            info!("🛑 Interrupt received, finishing the current turn...");
            stop.store(true, Ordering::SeqCst);
            worker.await
        }
    };
    let (outcome, recorder) = joined.map_err(|e| RunnerError::Join(e.to_string()))??;

    if let Some(path) = &config.output {
        recorder.export_json(path)?;
        info!("💾 Exported {} turns to {}", recorder.len(), path.display());
    }

    if outcome.interrupted {
        warn!("⚠️  Simulation interrupted after {} turns", outcome.turns_run);
    } else {
        info!("✅ Simulation finished after {} turns", outcome.turns_run);
    }
    info!("🏁 {} agents alive", outcome.survivors);

    Ok(outcome)
}

/// Build the environment and run it to completion (or until `stop` is set)
pub fn simulate(
    config: &SimulationConfig,
    seed: u64,
    stop: &AtomicBool,
) -> Result<(RunOutcome, MemoryRecorder), RunnerError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let roster = build_roster(config, &mut rng);

    let mut environment = Environment::new(config.settings(), roster, rng)?;
    let mut recorder = MemoryRecorder::new();
    let outcome = environment.run(&mut recorder, stop)?;
    Ok((outcome, recorder))
}

/// Honest agents first, then cheaters; each strategy owns an RNG drawn from the master
pub fn build_roster(config: &SimulationConfig, rng: &mut StdRng) -> Roster {
    let mut roster = Roster::new();
    let total = config.honest_agents + config.cheater_agents;

    for index in 0..total {
        let id = AgentId::random(rng);
        let strategy_rng = StdRng::seed_from_u64(rng.gen());
        let source: Box<dyn AgentDecisionSource> = if index < config.honest_agents {
            Box::new(Honest::new(strategy_rng))
        } else {
            Box::new(Cheater::new(strategy_rng, config.cheater_skim_percent))
        };
        debug!("Created {} ({})", id, if index < config.honest_agents { "honest" } else { "cheater" });
        roster.insert(Agent::new(id, config.initial_score, source));
    }
    roster
}

/// Runner errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Export error: {0}")]
    Io(#[from] RecorderError),

    #[error("Simulation task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            iterations: 2,
            turns_per_iteration: 4,
            honest_agents: 6,
            cheater_agents: 2,
            seed: Some(11),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_build_roster_counts() {
        let config = small_config();
        let roster = build_roster(&config, &mut StdRng::seed_from_u64(1));
        assert_eq!(roster.len(), 8);
        assert!(roster.iter().all(|a| a.alive && a.score == config.initial_score));
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = small_config();
        let (first, a) = simulate(&config, 11, &AtomicBool::new(false)).unwrap();
        let (second, b) = simulate(&config, 11, &AtomicBool::new(false)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.turns_run, 8);
        assert_eq!(a.records(), b.records());
    }

    #[tokio::test]
    async fn test_run_simulation_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("turns.json");
        let config = small_config().with_output(Some(path.clone()));

        let outcome = run_simulation(config).await.unwrap();
        assert!(!outcome.interrupted);

        let json = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["turns"].as_array().map(|t| t.len()), Some(8));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = small_config().with_agents(Some(0), Some(0));
        let result = run_simulation(config).await;
        assert!(matches!(result, Err(RunnerError::Config(_))));
    }
}
