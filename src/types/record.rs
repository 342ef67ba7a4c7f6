// Records - Per-turn snapshots handed to the recorder
use super::primitives::{AgentId, IterationNumber, Score, TeamId, TurnNumber};
use crate::governance::GovernanceKind;
use serde::{Deserialize, Serialize};

/// What one agent did during a turn, and where it ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent: AgentId,
    pub score: Score,
    pub team: Option<TeamId>,
    pub alive: bool,
    pub actual_contribution: Score,
    pub stated_contribution: Score,
    pub actual_withdrawal: Score,
    pub stated_withdrawal: Score,
}

/// Team state at the end of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team: TeamId,
    pub common_pool: Score,
    pub rule: GovernanceKind,
    pub members: usize,
}

/// Environment-wide values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonRecord {
    /// Survival threshold in force
    pub threshold: Score,

    /// True if the threshold was checked at the end of this turn
    pub threshold_applied: bool,
}

/// Full snapshot of one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub iteration: IterationNumber,
    pub turn: TurnNumber,
    pub agents: Vec<AgentRecord>,
    pub teams: Vec<TeamRecord>,
    pub common: CommonRecord,
}

impl TurnRecord {
    pub fn agent(&self, id: &AgentId) -> Option<&AgentRecord> {
        self.agents.iter().find(|a| &a.agent == id)
    }

    pub fn team(&self, id: &TeamId) -> Option<&TeamRecord> {
        self.teams.iter().find(|t| &t.team == id)
    }

    /// Number of agents alive when the snapshot was taken
    pub fn living_agents(&self) -> usize {
        self.agents.iter().filter(|a| a.alive).count()
    }
}
