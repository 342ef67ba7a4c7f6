// Agents - Decision sources plugged into the simulation
// Principle: The core asks, agents answer; heuristics live behind one trait
//
// An `Agent` is the slot the environment owns (score, team, alive flag).
// What the agent decides comes from its `AgentDecisionSource`, selected when
// the agent is created (honest, cheater, or a scripted source in tests).

pub mod messaging;
pub mod strategy;

use crate::governance::GovernanceKind;
use crate::types::{AgentId, RankBoundaries, Score, TeamId, Vote, DEFAULT_RANK_BOUNDARIES};
use crate::voting::Ballot;
use messaging::TeamView;
use std::collections::BTreeMap;
use std::fmt;

pub use messaging::Roster;
pub use strategy::{Cheater, Honest};

/// What an agent sees when it is asked for a decision
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// The agent being asked
    pub agent: AgentId,
    /// Its current score
    pub score: Score,
    /// The team it belongs to
    pub view: TeamView<'a>,
}

impl<'a> DecisionContext<'a> {
    /// Teammates, excluding the agent itself
    pub fn teammates(&self) -> impl Iterator<Item = &AgentId> + '_ {
        self.view.members.iter().filter(move |m| **m != self.agent)
    }
}

/// Call/response and notification contract between the core and an agent
///
/// Required methods cover the phases every rule runs. Everything else has a
/// neutral default so a source only overrides the sub-protocols it cares about.
pub trait AgentDecisionSource: Send + fmt::Debug {
    /// Dice: true to roll again after `previous_roll`, having `accumulated` so far
    fn stick_or_again(&mut self, accumulated: Score, previous_roll: Score) -> bool;

    fn actual_contribution(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score;

    fn stated_contribution(&mut self, ctx: &DecisionContext<'_>, actual: Score, expected: Score) -> Score;

    fn actual_withdrawal(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score;

    fn stated_withdrawal(&mut self, ctx: &DecisionContext<'_>, actual: Score, expected: Score) -> Score;

    fn contribution_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote;

    fn withdrawal_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote;

    // Notifications

    fn contribution_audit_result(&mut self, _agent: AgentId, _cheated: bool) {}

    fn withdrawal_audit_result(&mut self, _agent: AgentId, _cheated: bool) {}

    fn contribution_statement(&mut self, _from: AgentId, _stated: Score) {}

    fn withdrawal_statement(&mut self, _from: AgentId, _stated: Score) {}

    fn proposed_withdrawal_statement(&mut self, _from: AgentId, _proposed: Score) {}

    fn confession_statement(&mut self, _from: AgentId, _confessed: bool) {}

    fn leader_changed(&mut self, _leader: Option<AgentId>) {}

    // Rule selection and leadership

    /// Preference order over the rule menu, most preferred first
    fn governance_ranking(&mut self, _ctx: &DecisionContext<'_>, menu: &[GovernanceKind]) -> Vec<GovernanceKind> {
        menu.to_vec()
    }

    fn leader_vote(&mut self, _ctx: &DecisionContext<'_>, _candidates: &[AgentId]) -> Option<AgentId> {
        None
    }

    // Adventurer sub-protocols

    /// Approval per teammate (1 = rank them up)
    fn rank_up_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<AgentId, i32> {
        BTreeMap::new()
    }

    fn confession(&mut self, _ctx: &DecisionContext<'_>) -> bool {
        true
    }

    fn proposed_withdrawal(&mut self, _ctx: &DecisionContext<'_>, current_allowance: Score) -> Score {
        current_allowance
    }

    /// Approval per proposer (1 = accept their proposal)
    fn proposed_withdrawal_vote(
        &mut self,
        _ctx: &DecisionContext<'_>,
        _proposals: &BTreeMap<AgentId, Score>,
    ) -> BTreeMap<AgentId, i32> {
        BTreeMap::new()
    }

    /// Points per severity level 0..=4
    fn punishment_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<u8, i32> {
        BTreeMap::new()
    }

    // Rank-boundary sub-protocols

    /// `None` counts as an abstention
    fn boundary_proposal(&mut self, _ctx: &DecisionContext<'_>) -> Option<RankBoundaries> {
        Some(DEFAULT_RANK_BOUNDARIES)
    }

    /// Ranked ballot over the three candidates (lower, median, upper)
    fn boundary_ballot(&mut self, _ctx: &DecisionContext<'_>, _candidates: &[RankBoundaries; 3]) -> Option<Ballot> {
        Some(vec![1, 0, 2])
    }

    /// What a chair reports after running the boundary vote
    fn chair_boundary_report(&mut self, _ctx: &DecisionContext<'_>, agreed: RankBoundaries) -> RankBoundaries {
        agreed
    }

    /// What a chair reports after recomputing every member's rank
    fn chair_rank_report(
        &mut self,
        _ctx: &DecisionContext<'_>,
        computed: &BTreeMap<AgentId, u32>,
    ) -> BTreeMap<AgentId, u32> {
        computed.clone()
    }
}

/// Amounts moved by one agent in the current turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnActions {
    pub actual_contribution: Score,
    pub stated_contribution: Score,
    pub actual_withdrawal: Score,
    pub stated_withdrawal: Score,
}

/// An agent slot owned by the environment
#[derive(Debug)]
pub struct Agent {
    pub id: AgentId,
    pub score: Score,
    pub team: Option<TeamId>,
    /// Team held before dying or being expelled
    pub last_team: Option<TeamId>,
    pub alive: bool,
    pub actions: TurnActions,
    source: Box<dyn AgentDecisionSource>,
}

impl Agent {
    pub fn new(id: AgentId, score: Score, source: Box<dyn AgentDecisionSource>) -> Self {
        Self {
            id,
            score,
            team: None,
            last_team: None,
            alive: true,
            actions: TurnActions::default(),
            source,
        }
    }

    pub fn source_mut(&mut self) -> &mut dyn AgentDecisionSource {
        self.source.as_mut()
    }

    pub fn has_team(&self) -> bool {
        self.team.is_some()
    }

    pub fn join(&mut self, team: TeamId) {
        self.team = Some(team);
        self.last_team = Some(team);
    }

    /// Leave the current team, remembering it
    pub fn leave(&mut self) {
        if let Some(team) = self.team.take() {
            self.last_team = Some(team);
        }
    }

    pub fn kill(&mut self) {
        self.leave();
        self.alive = false;
    }

    pub fn revive(&mut self, score: Score) {
        self.alive = true;
        self.score = score;
    }

    /// Deduct up to the agent's score, returns what was taken
    pub fn deduct(&mut self, amount: Score) -> Score {
        let taken = amount.clamp(0, self.score.max(0));
        self.score -= taken;
        taken
    }
}
