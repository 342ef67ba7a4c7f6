// Strategies - Built-in decision sources used by the simulation binary
// Honest agents do what the rule expects; cheaters skim contributions and
// over-withdraw while declaring the expected amounts.

use super::{AgentDecisionSource, DecisionContext};
use crate::governance::GovernanceKind;
use crate::types::{percent_of, AgentId, RankBoundaries, Score, Vote, DEFAULT_RANK_BOUNDARIES};
use crate::voting::Ballot;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Keep rolling while the previous roll is below this
pub const ROLL_AGAIN_BELOW: Score = 10;

/// Probability of asking for an audit in a given phase
pub const AUDIT_VOTE_PROBABILITY: f64 = 0.3;

/// Behaviour shared by the built-in strategies
#[derive(Debug)]
struct Temperament {
    rng: StdRng,
    /// Last boundary vector this agent proposed
    proposal: RankBoundaries,
    /// Latest stated contribution heard from each teammate
    heard: BTreeMap<AgentId, Score>,
}

impl Temperament {
    fn new(rng: StdRng) -> Self {
        Self {
            rng,
            proposal: DEFAULT_RANK_BOUNDARIES,
            heard: BTreeMap::new(),
        }
    }

    fn audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        let teammates: Vec<AgentId> = ctx.teammates().copied().collect();
        let duration = self.rng.gen_range(1..=5);
        if teammates.is_empty() || !self.rng.gen_bool(AUDIT_VOTE_PROBABILITY) {
            return Vote::abstain(ctx.agent).with_duration(duration);
        }
        // Suspect whoever claimed the least
        let target = teammates
            .iter()
            .min_by_key(|id| self.heard.get(*id).copied().unwrap_or(Score::MAX))
            .copied()
            .unwrap_or(AgentId::NIL);
        Vote::new(1, ctx.agent, target).with_duration(duration)
    }

    fn propose_boundaries(&mut self) -> RankBoundaries {
        let mut proposal = DEFAULT_RANK_BOUNDARIES;
        for tier in proposal.iter_mut() {
            *tier += self.rng.gen_range(-2..=2);
        }
        proposal.sort_unstable();
        self.proposal = proposal;
        proposal
    }

    /// Rank candidates by distance to this agent's own proposal
    fn rank_candidates(&self, candidates: &[RankBoundaries; 3]) -> Ballot {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by_key(|&i| {
            candidates[i]
                .iter()
                .zip(self.proposal.iter())
                .map(|(c, p)| (c - p).abs())
                .sum::<Score>()
        });
        order
    }

    fn approvals(&mut self, candidates: impl Iterator<Item = AgentId>) -> BTreeMap<AgentId, i32> {
        candidates
            .map(|id| (id, i32::from(self.rng.gen_bool(0.5))))
            .collect()
    }

    fn punishment_vote(&mut self) -> BTreeMap<u8, i32> {
        (0..=4u8).map(|level| (level, self.rng.gen_range(0..5))).collect()
    }

    fn leader_vote(&mut self, candidates: &[AgentId]) -> Option<AgentId> {
        candidates.choose(&mut self.rng).copied()
    }

    fn governance_ranking(&mut self, menu: &[GovernanceKind]) -> Vec<GovernanceKind> {
        let mut ranking = menu.to_vec();
        ranking.shuffle(&mut self.rng);
        ranking
    }
}

/// Contributes and withdraws exactly what is expected, always truthful
#[derive(Debug)]
pub struct Honest {
    temperament: Temperament,
}

impl Honest {
    pub fn new(rng: StdRng) -> Self {
        Self {
            temperament: Temperament::new(rng),
        }
    }
}

impl AgentDecisionSource for Honest {
    fn stick_or_again(&mut self, _accumulated: Score, previous_roll: Score) -> bool {
        previous_roll < ROLL_AGAIN_BELOW
    }

    fn actual_contribution(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score {
        expected.clamp(0, ctx.score.max(0))
    }

    fn stated_contribution(&mut self, _ctx: &DecisionContext<'_>, actual: Score, _expected: Score) -> Score {
        actual
    }

    fn actual_withdrawal(&mut self, _ctx: &DecisionContext<'_>, expected: Score) -> Score {
        expected.max(0)
    }

    fn stated_withdrawal(&mut self, _ctx: &DecisionContext<'_>, actual: Score, _expected: Score) -> Score {
        actual
    }

    fn contribution_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        self.temperament.audit_vote(ctx)
    }

    fn withdrawal_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        self.temperament.audit_vote(ctx)
    }

    fn contribution_statement(&mut self, from: AgentId, stated: Score) {
        self.temperament.heard.insert(from, stated);
    }

    fn governance_ranking(&mut self, _ctx: &DecisionContext<'_>, menu: &[GovernanceKind]) -> Vec<GovernanceKind> {
        self.temperament.governance_ranking(menu)
    }

    fn leader_vote(&mut self, _ctx: &DecisionContext<'_>, candidates: &[AgentId]) -> Option<AgentId> {
        self.temperament.leader_vote(candidates)
    }

    fn rank_up_vote(&mut self, ctx: &DecisionContext<'_>) -> BTreeMap<AgentId, i32> {
        self.temperament.approvals(ctx.teammates().copied())
    }

    fn confession(&mut self, _ctx: &DecisionContext<'_>) -> bool {
        true
    }

    fn proposed_withdrawal(&mut self, _ctx: &DecisionContext<'_>, current_allowance: Score) -> Score {
        current_allowance + self.temperament.rng.gen_range(0..=2)
    }

    fn proposed_withdrawal_vote(
        &mut self,
        _ctx: &DecisionContext<'_>,
        proposals: &BTreeMap<AgentId, Score>,
    ) -> BTreeMap<AgentId, i32> {
        self.temperament.approvals(proposals.keys().copied())
    }

    fn punishment_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<u8, i32> {
        self.temperament.punishment_vote()
    }

    fn boundary_proposal(&mut self, _ctx: &DecisionContext<'_>) -> Option<RankBoundaries> {
        Some(self.temperament.propose_boundaries())
    }

    fn boundary_ballot(&mut self, _ctx: &DecisionContext<'_>, candidates: &[RankBoundaries; 3]) -> Option<Ballot> {
        Some(self.temperament.rank_candidates(candidates))
    }
}

/// Skims a share of what it should give, takes more than it should, and lies about both
#[derive(Debug)]
pub struct Cheater {
    temperament: Temperament,
    skim_percent: u32,
}

impl Cheater {
    pub fn new(rng: StdRng, skim_percent: u32) -> Self {
        Self {
            temperament: Temperament::new(rng),
            skim_percent: skim_percent.min(100),
        }
    }
}

impl AgentDecisionSource for Cheater {
    fn stick_or_again(&mut self, _accumulated: Score, previous_roll: Score) -> bool {
        previous_roll < ROLL_AGAIN_BELOW
    }

    fn actual_contribution(&mut self, ctx: &DecisionContext<'_>, expected: Score) -> Score {
        let owed = expected.clamp(0, ctx.score.max(0));
        owed - percent_of(owed, self.skim_percent)
    }

    fn stated_contribution(&mut self, ctx: &DecisionContext<'_>, _actual: Score, expected: Score) -> Score {
        expected.clamp(0, ctx.score.max(0))
    }

    fn actual_withdrawal(&mut self, _ctx: &DecisionContext<'_>, expected: Score) -> Score {
        let expected = expected.max(0);
        expected + percent_of(expected, self.skim_percent).max(1)
    }

    fn stated_withdrawal(&mut self, _ctx: &DecisionContext<'_>, actual: Score, expected: Score) -> Score {
        expected.clamp(0, actual.max(0))
    }

    fn contribution_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        self.temperament.audit_vote(ctx)
    }

    fn withdrawal_audit_vote(&mut self, ctx: &DecisionContext<'_>) -> Vote {
        // Never volunteers for a withdrawal audit
        Vote::abstain(ctx.agent)
    }

    fn contribution_statement(&mut self, from: AgentId, stated: Score) {
        self.temperament.heard.insert(from, stated);
    }

    fn governance_ranking(&mut self, _ctx: &DecisionContext<'_>, menu: &[GovernanceKind]) -> Vec<GovernanceKind> {
        self.temperament.governance_ranking(menu)
    }

    fn leader_vote(&mut self, ctx: &DecisionContext<'_>, candidates: &[AgentId]) -> Option<AgentId> {
        if candidates.contains(&ctx.agent) {
            return Some(ctx.agent);
        }
        self.temperament.leader_vote(candidates)
    }

    fn rank_up_vote(&mut self, ctx: &DecisionContext<'_>) -> BTreeMap<AgentId, i32> {
        self.temperament.approvals(ctx.teammates().copied())
    }

    fn confession(&mut self, _ctx: &DecisionContext<'_>) -> bool {
        self.temperament.rng.gen_bool(0.5)
    }

    fn proposed_withdrawal(&mut self, _ctx: &DecisionContext<'_>, current_allowance: Score) -> Score {
        current_allowance + self.temperament.rng.gen_range(0..=10)
    }

    fn proposed_withdrawal_vote(
        &mut self,
        ctx: &DecisionContext<'_>,
        proposals: &BTreeMap<AgentId, Score>,
    ) -> BTreeMap<AgentId, i32> {
        let mut votes = self.temperament.approvals(proposals.keys().copied());
        votes.insert(ctx.agent, 1);
        votes
    }

    fn punishment_vote(&mut self, _ctx: &DecisionContext<'_>) -> BTreeMap<u8, i32> {
        // Always pushes for leniency
        let mut votes = self.temperament.punishment_vote();
        *votes.entry(0).or_insert(0) += 5;
        votes
    }

    fn boundary_proposal(&mut self, _ctx: &DecisionContext<'_>) -> Option<RankBoundaries> {
        Some(self.temperament.propose_boundaries())
    }

    fn boundary_ballot(&mut self, _ctx: &DecisionContext<'_>, candidates: &[RankBoundaries; 3]) -> Option<Ballot> {
        Some(self.temperament.rank_candidates(candidates))
    }

    fn chair_rank_report(
        &mut self,
        ctx: &DecisionContext<'_>,
        computed: &BTreeMap<AgentId, u32>,
    ) -> BTreeMap<AgentId, u32> {
        let mut report = computed.clone();
        if let Some(rank) = report.get_mut(&ctx.agent) {
            *rank = rank.saturating_add(1);
        }
        report
    }
}
