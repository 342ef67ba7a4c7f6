// Server - Drives the simulation
// Principle: The server owns time; agents and rules only react to it

pub mod dice;
pub mod environment;
pub mod formation;
pub mod recorder;
pub mod turn;

use crate::governance::GovernanceError;

pub use environment::{Environment, EnvironmentSettings, RunOutcome};
pub use recorder::{MemoryRecorder, Recorder, RecorderError};
pub use turn::{AuditEvent, AuditPhase, TurnProtocol, TurnSummary};

/// Simulation errors
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Governance error: {0}")]
    Governance(#[from] GovernanceError),

    #[error("The simulation has no agents")]
    NoAgents,

    #[error("The governance menu is empty")]
    EmptyTeamMenu,
}
