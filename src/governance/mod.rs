// Governance - Articles of Association bound to each team
// Principle: One common contract, optional capabilities for team-specific sub-protocols
//
// Every team holds exactly one rule per iteration. The turn protocol only talks to
// `GovernanceRule`; variant-specific sub-protocols (rank-up votes, confessions,
// leadership) are reached through the `as_*` capability accessors, which return
// `None` for rules that do not take part in them.

pub mod audit_record;
pub mod leaky_queue;
pub mod fixed;
pub mod rank_boundary;
pub mod leader;
pub mod adventurer;
pub mod monitoring;

use crate::agents::messaging::{Roster, TeamView};
use crate::types::{AgentId, Score, TeamId, Vote};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use adventurer::{AdventurerParams, AdventurerRank, AdventurerRule};
pub use audit_record::AuditRecord;
pub use fixed::{FixedParams, FixedRule};
pub use leader::{LeaderParams, LeaderRule};
pub use leaky_queue::LeakyQueue;
pub use monitoring::{MonitoringParams, MonitoringRule};
pub use rank_boundary::{RankBoundaryParams, RankBoundaryRule};

/// Governance errors
///
/// Only the conditions that would silently corrupt an aggregation are errors;
/// "nobody qualifies" and "no team" are sentinels, not failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernanceError {
    #[error("No boundary proposals were gathered")]
    NoProposals,

    #[error("Not enough agents: requested {requested}, available {available}")]
    NotEnoughAgents { requested: usize, available: usize },

    #[error("Weighted selection over a population with zero total weight")]
    ZeroTotalWeight,

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),
}

/// The available rule variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceKind {
    /// Expected contribution = score, flat withdrawal
    Fixed,
    /// Rank tiers with chair-negotiated boundaries
    RankBoundary,
    /// Leader-weighted votes and allowances
    Leader,
    /// Adventurer ladder with confessions
    Adventurer,
    /// Escalating monitoring of caught cheaters
    Monitoring,
}

impl GovernanceKind {
    pub const ALL: [GovernanceKind; 5] = [
        GovernanceKind::Fixed,
        GovernanceKind::RankBoundary,
        GovernanceKind::Leader,
        GovernanceKind::Adventurer,
        GovernanceKind::Monitoring,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GovernanceKind::Fixed => "fixed",
            GovernanceKind::RankBoundary => "rank_boundary",
            GovernanceKind::Leader => "leader",
            GovernanceKind::Adventurer => "adventurer",
            GovernanceKind::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for GovernanceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a hook may touch while running a team sub-protocol
pub struct GovernanceContext<'a> {
    pub team_id: TeamId,
    pub members: &'a [AgentId],
    pub common_pool: Score,
    pub roster: &'a mut Roster,
    pub rng: &'a mut StdRng,
}

impl<'a> GovernanceContext<'a> {
    /// Read-only view handed to decision sources
    pub fn view(&self, kind: GovernanceKind) -> TeamView<'a> {
        TeamView {
            team: self.team_id,
            members: self.members,
            common_pool: self.common_pool,
            kind,
        }
    }
}

/// Ballots keyed by voter, then by candidate (1 = approve)
pub type ApprovalBallots = BTreeMap<AgentId, BTreeMap<AgentId, i32>>;

/// Severity ballots keyed by voter, then by severity level
pub type SeverityBallots = BTreeMap<AgentId, BTreeMap<u8, i32>>;

/// The common contract every rule satisfies
pub trait GovernanceRule: Send + fmt::Debug {
    fn kind(&self) -> GovernanceKind;

    /// Called whenever the team's member list changes
    fn sync_members(&mut self, _members: &[AgentId]) {}

    fn expected_contribution(&self, agent: AgentId, score: Score) -> Score;

    fn expected_withdrawal(&self, agent: AgentId, score: Score, common_pool: Score) -> Score;

    /// Note what the agent gave versus what it claimed (one call per agent per turn)
    fn record_contribution_audit(&mut self, agent: AgentId, score: Score, actual: Score, stated: Score);

    /// True if the agent cheated; consumes the history it read
    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool;

    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        score: Score,
        actual: Score,
        stated: Score,
        common_pool: Score,
    );

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool;

    /// Charged to the common pool when an audit runs
    fn audit_cost(&self, common_pool: Score) -> Score;

    /// Who gets audited, if anyone
    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId>;

    fn withdrawal_order(&self, agents: &[AgentId], rng: &mut StdRng) -> Vec<AgentId>;

    /// Deduction for a caught cheater
    fn punishment(&self, score: Score, agent: AgentId) -> Score;

    fn run_pre_iteration(&mut self, _ctx: &mut GovernanceContext<'_>) -> Result<(), GovernanceError> {
        Ok(())
    }

    fn run_post_contribution(&mut self, _ctx: &mut GovernanceContext<'_>) -> Result<(), GovernanceError> {
        Ok(())
    }

    /// Per-turn decay and escalation
    fn end_of_turn(&mut self, _rng: &mut StdRng) {}

    /// Members the rule wants removed from the team, drained on read
    fn members_to_expel(&mut self) -> Vec<AgentId> {
        Vec::new()
    }

    /// Deducted from a member as it is expelled
    fn expulsion_penalty(&self, _score: Score, _agent: AgentId) -> Score {
        0
    }

    fn as_rank_voting(&mut self) -> Option<&mut dyn RankVoting> {
        None
    }

    fn as_withdrawal_proposals(&mut self) -> Option<&mut dyn WithdrawalProposals> {
        None
    }

    fn as_confession(&mut self) -> Option<&mut dyn ConfessionHandling> {
        None
    }

    fn as_leadership(&mut self) -> Option<&mut dyn Leadership> {
        None
    }
}

/// Members vote each other up a rank
pub trait RankVoting {
    /// Returns the agents that were promoted
    fn apply_rank_up_votes(&mut self, ballots: &ApprovalBallots) -> Vec<AgentId>;
}

/// Members propose their own withdrawal allowance and vote on each other's
pub trait WithdrawalProposals {
    /// Returns the agents whose proposal was accepted
    fn apply_withdrawal_proposals(
        &mut self,
        proposals: &BTreeMap<AgentId, Score>,
        ballots: &ApprovalBallots,
    ) -> Vec<AgentId>;
}

/// Caught agents may confess; the team votes on how hard to punish
pub trait ConfessionHandling {
    /// Tally severity ballots and keep the winner for the next deductions
    fn apply_punishment_votes(&mut self, ballots: &SeverityBallots) -> u8;

    fn confession_deduction(&self, agent: AgentId, score: Score, confessed: bool) -> Score;
}

/// A single member holds extra weight
pub trait Leadership {
    fn leader(&self) -> Option<AgentId>;

    fn install(&mut self, leader: AgentId);

    fn depose(&mut self);
}

/// Tunables of every variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    pub fixed: FixedParams,
    pub rank_boundary: RankBoundaryParams,
    pub leader: LeaderParams,
    pub adventurer: AdventurerParams,
    pub monitoring: MonitoringParams,
}

/// Build a fresh rule of the given kind
pub fn create_rule(
    kind: GovernanceKind,
    params: &GovernanceParams,
    audit_window: usize,
) -> Box<dyn GovernanceRule> {
    match kind {
        GovernanceKind::Fixed => Box::new(FixedRule::new(params.fixed.clone(), audit_window)),
        GovernanceKind::RankBoundary => {
            Box::new(RankBoundaryRule::new(params.rank_boundary.clone()))
        }
        GovernanceKind::Leader => Box::new(LeaderRule::new(params.leader.clone(), audit_window)),
        GovernanceKind::Adventurer => Box::new(AdventurerRule::new(params.adventurer.clone())),
        GovernanceKind::Monitoring => Box::new(MonitoringRule::new(params.monitoring.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_every_kind() {
        let params = GovernanceParams::default();
        for kind in GovernanceKind::ALL {
            let rule = create_rule(kind, &params, 5);
            assert_eq!(rule.kind(), kind);
        }
    }

    #[test]
    fn test_kind_names_roundtrip_through_serde() {
        for kind in GovernanceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
            let back: GovernanceKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_capabilities_per_kind() {
        let params = GovernanceParams::default();
        let mut adventurer = create_rule(GovernanceKind::Adventurer, &params, 5);
        assert!(adventurer.as_rank_voting().is_some());
        assert!(adventurer.as_confession().is_some());
        assert!(adventurer.as_leadership().is_none());

        let mut leader = create_rule(GovernanceKind::Leader, &params, 5);
        assert!(leader.as_leadership().is_some());
        assert!(leader.as_rank_voting().is_none());

        let mut fixed = create_rule(GovernanceKind::Fixed, &params, 5);
        assert!(fixed.as_withdrawal_proposals().is_none());
    }
}
