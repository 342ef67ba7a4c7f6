// Adventurer - Guild ranks, voted allowances and confessions
// Principle: Vote weight follows rank; every rank is earned through peer approval
//
// Members start at rank F with a withdrawal allowance of one. Peers vote each
// other up the ladder and vote on allowance proposals, weighted by rank.
// An agent caught cheating may confess for the severity the team voted on;
// denying is punished harder.

use super::{
    ApprovalBallots, ConfessionHandling, GovernanceKind, GovernanceRule, RankVoting,
    SeverityBallots, WithdrawalProposals,
};
use crate::types::{percent_of, AgentId, Score, Vote};
use crate::voting::{top_reaching, weighted_tally};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Audit entries remembered per agent
pub const HISTORY_LIMIT: usize = 8;

/// Punishment per severity level, in percent of score
pub const SEVERITY_PERCENT: [u32; 5] = [0, 25, 50, 75, 100];

/// The ladder, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum AdventurerRank {
    #[default]
    F,
    E,
    D,
    C,
    B,
    A,
    S,
    SS,
    SSS,
}

impl AdventurerRank {
    /// Next rung; SSS stays SSS
    pub fn promote(self) -> Self {
        match self {
            AdventurerRank::F => AdventurerRank::E,
            AdventurerRank::E => AdventurerRank::D,
            AdventurerRank::D => AdventurerRank::C,
            AdventurerRank::C => AdventurerRank::B,
            AdventurerRank::B => AdventurerRank::A,
            AdventurerRank::A => AdventurerRank::S,
            AdventurerRank::S => AdventurerRank::SS,
            AdventurerRank::SS | AdventurerRank::SSS => AdventurerRank::SSS,
        }
    }

    /// Vote weight
    pub fn weight(self) -> i64 {
        match self {
            AdventurerRank::SSS => 10,
            AdventurerRank::SS => 9,
            AdventurerRank::S => 8,
            AdventurerRank::A => 6,
            AdventurerRank::B => 4,
            AdventurerRank::C => 3,
            AdventurerRank::D => 2,
            AdventurerRank::E | AdventurerRank::F => 1,
        }
    }
}

impl fmt::Display for AdventurerRank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Adventurer rule tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdventurerParams {
    pub expected_contribution: Score,
    /// Allowance every member starts with
    pub initial_withdrawal: Score,
    pub audit_cost: Score,
    /// Share of the team (weighted) needed to audit or accept a proposal
    pub vote_threshold_percent: u32,
    /// Share of the team (headcount) needed to rank someone up
    pub rank_up_threshold_percent: u32,
    /// Starting punishment, rounded down to a severity level
    pub punishment_percent: u32,
}

impl Default for AdventurerParams {
    fn default() -> Self {
        Self {
            expected_contribution: 2,
            initial_withdrawal: 1,
            audit_cost: 1,
            vote_threshold_percent: 70,
            rank_up_threshold_percent: 50,
            punishment_percent: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AuditEntry {
    /// Amount hidden from the team, 0 when honest
    discrepancy: Score,
    audited: bool,
}

#[derive(Debug, Clone)]
pub struct AdventurerRule {
    params: AdventurerParams,
    members: Vec<AgentId>,
    ranks: BTreeMap<AgentId, AdventurerRank>,
    allowances: BTreeMap<AgentId, Score>,
    history: BTreeMap<AgentId, Vec<AuditEntry>>,
    severity: u8,
}

impl AdventurerRule {
    pub fn new(params: AdventurerParams) -> Self {
        let severity = (params.punishment_percent / 25).min(4) as u8;
        Self {
            params,
            members: Vec::new(),
            ranks: BTreeMap::new(),
            allowances: BTreeMap::new(),
            history: BTreeMap::new(),
            severity,
        }
    }

    pub fn rank(&self, agent: &AgentId) -> AdventurerRank {
        self.ranks.get(agent).copied().unwrap_or_default()
    }

    pub fn allowance(&self, agent: &AgentId) -> Score {
        self.allowances
            .get(agent)
            .copied()
            .unwrap_or(self.params.initial_withdrawal)
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    fn team_size(&self) -> usize {
        self.members.len().max(self.ranks.len())
    }

    fn threshold(&self, percent: u32) -> i64 {
        ((self.team_size() as i64 * i64::from(percent)) / 100).max(1)
    }

    fn push_entry(&mut self, agent: AgentId, discrepancy: Score) {
        let entries = self.history.entry(agent).or_default();
        entries.push(AuditEntry {
            discrepancy: discrepancy.max(0),
            audited: false,
        });
        if entries.len() > HISTORY_LIMIT {
            entries.remove(0);
        }
    }

    /// Mark the newest unaudited entry as read
    fn consume_entry(&mut self, agent: AgentId) -> bool {
        let Some(entries) = self.history.get_mut(&agent) else {
            return false;
        };
        match entries.iter_mut().rev().find(|e| !e.audited) {
            Some(entry) => {
                entry.audited = true;
                entry.discrepancy > 0
            }
            None => false,
        }
    }

    fn recently_caught(&self, agent: &AgentId) -> bool {
        self.history
            .get(agent)
            .map(|entries| entries.iter().rev().take(2).any(|e| e.discrepancy > 0))
            .unwrap_or(false)
    }
}

impl GovernanceRule for AdventurerRule {
    fn kind(&self) -> GovernanceKind {
        GovernanceKind::Adventurer
    }

    fn sync_members(&mut self, members: &[AgentId]) {
        self.members = members.to_vec();
        self.ranks.retain(|agent, _| members.contains(agent));
        self.allowances.retain(|agent, _| members.contains(agent));
        self.history.retain(|agent, _| members.contains(agent));
        for agent in members {
            self.ranks.entry(*agent).or_default();
            self.allowances
                .entry(*agent)
                .or_insert(self.params.initial_withdrawal);
        }
    }

    fn expected_contribution(&self, _agent: AgentId, _score: Score) -> Score {
        self.params.expected_contribution
    }

    fn expected_withdrawal(&self, agent: AgentId, _score: Score, _common_pool: Score) -> Score {
        self.allowance(&agent)
    }

    fn record_contribution_audit(&mut self, agent: AgentId, _score: Score, actual: Score, stated: Score) {
        self.push_entry(agent, stated - actual);
    }

    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_entry(agent)
    }

    /// Under-reporting, or taking more than the voted allowance
    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        _score: Score,
        actual: Score,
        stated: Score,
        _common_pool: Score,
    ) {
        let over_allowance = actual - self.allowance(&agent);
        self.push_entry(agent, (actual - stated).max(over_allowance));
    }

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_entry(agent)
    }

    fn audit_cost(&self, _common_pool: Score) -> Score {
        self.params.audit_cost
    }

    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId> {
        let tally = weighted_tally(votes, |v| self.rank(&v.voter).weight());
        top_reaching(&tally, self.threshold(self.params.vote_threshold_percent))
    }

    /// Highest weight first, ties keep the given order
    fn withdrawal_order(&self, agents: &[AgentId], _rng: &mut StdRng) -> Vec<AgentId> {
        let mut order = agents.to_vec();
        order.sort_by_key(|agent| std::cmp::Reverse(self.rank(agent).weight()));
        order
    }

    fn punishment(&self, score: Score, _agent: AgentId) -> Score {
        percent_of(score, SEVERITY_PERCENT[usize::from(self.severity.min(4))])
    }

    fn as_rank_voting(&mut self) -> Option<&mut dyn RankVoting> {
        Some(self)
    }

    fn as_withdrawal_proposals(&mut self) -> Option<&mut dyn WithdrawalProposals> {
        Some(self)
    }

    fn as_confession(&mut self) -> Option<&mut dyn ConfessionHandling> {
        Some(self)
    }
}

impl RankVoting for AdventurerRule {
    fn apply_rank_up_votes(&mut self, ballots: &ApprovalBallots) -> Vec<AgentId> {
        let mut approvals: BTreeMap<AgentId, i64> = BTreeMap::new();
        for ballot in ballots.values() {
            for (candidate, vote) in ballot {
                if *vote >= 1 && self.ranks.contains_key(candidate) {
                    *approvals.entry(*candidate).or_insert(0) += 1;
                }
            }
        }

        let threshold = self.threshold(self.params.rank_up_threshold_percent);
        let promoted: Vec<AgentId> = approvals
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(agent, _)| agent)
            .collect();

        for agent in &promoted {
            let rank = self.rank(agent).promote();
            self.ranks.insert(*agent, rank);
            info!("⬆️  {} ranked up to {}", agent, rank);
        }
        promoted
    }
}

impl WithdrawalProposals for AdventurerRule {
    fn apply_withdrawal_proposals(
        &mut self,
        proposals: &BTreeMap<AgentId, Score>,
        ballots: &ApprovalBallots,
    ) -> Vec<AgentId> {
        let mut support: BTreeMap<AgentId, i64> = BTreeMap::new();
        for (voter, ballot) in ballots {
            let weight = self.rank(voter).weight();
            for (proposer, vote) in ballot {
                if *vote >= 1 {
                    *support.entry(*proposer).or_insert(0) += weight;
                }
            }
        }

        let threshold = self.threshold(self.params.vote_threshold_percent);
        let mut accepted = Vec::new();
        for (proposer, weight) in support {
            let Some(proposal) = proposals.get(&proposer) else {
                continue;
            };
            if weight >= threshold {
                debug!(
                    "{} allowance {} -> {}",
                    proposer,
                    self.allowance(&proposer),
                    proposal
                );
                self.allowances.insert(proposer, (*proposal).max(0));
                accepted.push(proposer);
            }
        }
        accepted
    }
}

impl ConfessionHandling for AdventurerRule {
    /// Highest tally wins; a tie goes to the milder level
    fn apply_punishment_votes(&mut self, ballots: &SeverityBallots) -> u8 {
        let mut tally = [0i64; SEVERITY_PERCENT.len()];
        for ballot in ballots.values() {
            for (level, points) in ballot {
                if let Some(slot) = tally.get_mut(usize::from(*level)) {
                    *slot += i64::from(*points);
                }
            }
        }

        if tally.iter().all(|t| *t == 0) {
            return self.severity;
        }

        let mut best = 0;
        for (level, points) in tally.iter().enumerate() {
            if *points > tally[best] {
                best = level;
            }
        }
        self.severity = best as u8;
        self.severity
    }

    /// Confessing costs the voted punishment; denying with a recent record
    /// costs double; denying outright costs everything
    fn confession_deduction(&self, agent: AgentId, score: Score, confessed: bool) -> Score {
        let punishment = self.punishment(score, agent);
        if confessed {
            punishment
        } else if self.recently_caught(&agent) {
            punishment.saturating_mul(2).min(score.max(0))
        } else {
            score.max(0)
        }
    }
}
