// Test support - Scripted decision sources and small builders
// Every answer a `Scripted` agent gives is fixed up front; what it is told is logged.

use crate::agents::{Agent, AgentDecisionSource, DecisionContext, Roster};
use crate::governance::GovernanceKind;
use crate::types::{AgentId, RankBoundaries, Score, Vote, DEFAULT_RANK_BOUNDARIES};
use crate::voting::Ballot;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Fixed answers; `None` means "do what the rule expects"
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub contribute: Option<Score>,
    pub state_contribution: Option<Score>,
    pub withdraw: Option<Score>,
    pub state_withdrawal: Option<Score>,
    pub contribution_audit_target: Option<AgentId>,
    pub withdrawal_audit_target: Option<AgentId>,
    pub audit_duration: u32,
    pub roll_again: bool,
    pub ranking: Option<Vec<GovernanceKind>>,
    pub leader_choice: Option<AgentId>,
    pub proposal: Option<RankBoundaries>,
    pub ballot: Option<Ballot>,
    pub report_boundaries: Option<RankBoundaries>,
    pub inflate_own_rank: bool,
    pub rank_up: Vec<AgentId>,
    pub deny: bool,
    pub proposed_withdrawal: Option<Score>,
    pub approve_proposals: Vec<AgentId>,
    pub severity: Option<u8>,
}

/// What scripted agents observed
#[derive(Debug, Default)]
pub struct Observations {
    /// (agent, pool it saw) when asked for its withdrawal
    pub pools_at_withdrawal: Vec<(AgentId, Score)>,
    /// (agent, pool it saw) when asked for its contribution
    pub pools_at_contribution: Vec<(AgentId, Score)>,
    /// (receiver, audited agent, cheated)
    pub contribution_results: Vec<(AgentId, AgentId, bool)>,
    pub withdrawal_results: Vec<(AgentId, AgentId, bool)>,
    /// (receiver, sender, stated)
    pub contribution_statements: Vec<(AgentId, AgentId, Score)>,
    pub withdrawal_statements: Vec<(AgentId, AgentId, Score)>,
    pub leaders: Vec<Option<AgentId>>,
}

pub type SharedLog = Arc<Mutex<Observations>>;

#[derive(Debug)]
pub struct Scripted {
    id: AgentId,
    script: Script,
    log: SharedLog,
}

impl Scripted {
    pub fn new(id: AgentId, script: Script, log: SharedLog) -> Self {
        Self { id, script, log }
    }

    fn record<F: FnOnce(&mut Observations)>(&self, f: F) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }

    fn vote(&self, ctx: &DecisionContext<'_>, target: Option<AgentId>) -> Vote {
        let vote = match target {
            Some(target) => Vote::new(1, ctx.agent, target),
            None => Vote::abstain(ctx.agent),
        };
        vote.with_duration(self.script.audit_duration)
    }
}

impl AgentDecisionSource for Scripted {
    fn stick_or_again(&mut self, _accumulated: Score, _previous_roll: Score) -> bool {
        self.script.roll_again
    }

    fn actual_contribution(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score {
        self.record(|log| log.pools_at_contribution.push((ctx.agent, ctx.view.common_pool)));
        self.script
            .contribute
            .unwrap_or_else(|| expected.clamp(0, ctx.score.max(0)))
    }

    fn stated_contribution(&mut self, _ctx: &DecisionContext<'_>, actual: Score, _expected: Score) -> Score {
        self.script.state_contribution.unwrap_or(actual)
    }

    fn actual_withdrawal(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score {
        self.record(|log| log.pools_at_withdrawal.push((ctx.agent, ctx.view.common_pool)));
        self.script.withdraw.unwrap_or(expected)
    }

    fn stated_withdrawal(&mut self, _ctx: &DecisionContext<'_>, actual: Score, _expected: Score) -> Score {
        self.script.state_withdrawal.unwrap_or(actual)
    }

    fn contribution_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        self.vote(ctx, self.script.contribution_audit_target)
    }

    fn withdrawal_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        self.vote(ctx, self.script.withdrawal_audit_target)
    }

    fn contribution_audit_result(&mut self, agent: AgentId, cheated: bool) {
        let me = self.id;
        self.record(|log| log.contribution_results.push((me, agent, cheated)));
    }

    fn withdrawal_audit_result(&mut self, agent: AgentId, cheated: bool) {
        let me = self.id;
        self.record(|log| log.withdrawal_results.push((me, agent, cheated)));
    }

    fn contribution_statement(&mut self, from: AgentId, stated: Score) {
        let me = self.id;
        self.record(|log| log.contribution_statements.push((me, from, stated)));
    }

    fn withdrawal_statement(&mut self, from: AgentId, stated: Score) {
        let me = self.id;
        self.record(|log| log.withdrawal_statements.push((me, from, stated)));
    }

    fn leader_changed(&mut self, leader: Option<AgentId>) {
        self.record(|log| log.leaders.push(leader));
    }

    fn governance_ranking(&mut self, _ctx: &DecisionContext<'_>, menu: &[GovernanceKind]) -> Vec<GovernanceKind> {
        self.script.ranking.clone().unwrap_or_else(|| menu.to_vec())
    }

    fn leader_vote(&mut self, _ctx: &DecisionContext<'_>, _candidates: &[AgentId]) -> Option<AgentId> {
        self.script.leader_choice
    }

    fn rank_up_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<AgentId, i32> {
        self.script.rank_up.iter().map(|id| (*id, 1)).collect()
    }

    fn confession(&mut self, _ctx: &DecisionContext<'_>) -> bool {
        !self.script.deny
    }

    fn proposed_withdrawal(&mut self, _ctx: &DecisionContext<'_>, current_allowance: Score) -> Score {
        self.script.proposed_withdrawal.unwrap_or(current_allowance)
    }

    fn proposed_withdrawal_vote(
        &mut self,
        _ctx: &DecisionContext<'_>,
        _proposals: &BTreeMap<AgentId, Score>,
    ) -> BTreeMap<AgentId, i32> {
        self.script.approve_proposals.iter().map(|id| (*id, 1)).collect()
    }

    fn punishment_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<u8, i32> {
        self.script
            .severity
            .map(|level| BTreeMap::from([(level, 1)]))
            .unwrap_or_default()
    }

    fn boundary_proposal(&mut self, _ctx: &DecisionContext<'_>) -> Option<RankBoundaries> {
        Some(self.script.proposal.unwrap_or(DEFAULT_RANK_BOUNDARIES))
    }

    fn boundary_ballot(&mut self, _ctx: &DecisionContext<'_>, _candidates: &[RankBoundaries; 3]) -> Option<Ballot> {
        Some(self.script.ballot.clone().unwrap_or_else(|| vec![1, 0, 2]))
    }

    fn chair_boundary_report(&mut self, _ctx: &DecisionContext<'_>, agreed: RankBoundaries) -> RankBoundaries {
        self.script.report_boundaries.unwrap_or(agreed)
    }

    fn chair_rank_report(
        &mut self,
        ctx: &DecisionContext<'_>,
        computed: &BTreeMap<AgentId, u32>,
    ) -> BTreeMap<AgentId, u32> {
        let mut report = computed.clone();
        if self.script.inflate_own_rank {
            if let Some(rank) = report.get_mut(&ctx.agent) {
                *rank += 1;
            }
        }
        report
    }
}

/// `n` ids numbered from 1, in ascending order
pub fn ids(n: u128) -> Vec<AgentId> {
    (1..=n).map(AgentId::from_u128).collect()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Roster of scripted agents (id, starting score, script) sharing one log
pub fn roster_with(agents: Vec<(AgentId, Score, Script)>) -> (Roster, SharedLog) {
    let log: SharedLog = Arc::new(Mutex::new(Observations::default()));
    let mut roster = Roster::new();
    for (id, score, script) in agents {
        let source = Scripted::new(id, script, Arc::clone(&log));
        roster.insert(Agent::new(id, score, Box::new(source)));
    }
    (roster, log)
}
