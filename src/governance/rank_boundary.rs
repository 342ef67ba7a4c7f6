// Rank Boundary - Rank tiers set by member-negotiated contribution boundaries
// Principle: Two independently drawn chairs must reach the same answer, or nothing changes
//
// Each member climbs (or falls) one tier per turn according to the sum of its
// recent stated contributions. The five boundaries are renegotiated at every
// iteration start: every member's proposal is gathered, three quartile
// candidates are built and a Condorcet vote picks one. Each chair then reports
// the result; chairs that disagree are both demoted and a new pair is drawn.

use super::leaky_queue::LeakyQueue;
use super::{GovernanceContext, GovernanceError, GovernanceKind, GovernanceRule};
use crate::types::{percent_of, AgentId, RankBoundaries, Score, Vote, DEFAULT_RANK_BOUNDARIES};
use crate::voting::quartile::enforce_monotonic;
use crate::voting::{generate_candidates, resolve_boundary_ballots, weighted_sample};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lowest rank
pub const MIN_RANK: u32 = 1;
/// Highest rank (one per boundary)
pub const MAX_RANK: u32 = 5;
/// Chairs drawn per negotiation attempt
pub const CHAIRS: usize = 2;

/// Rank-boundary rule tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankBoundaryParams {
    pub initial_boundaries: RankBoundaries,
    /// Turns of contributions remembered per agent
    pub queue_capacity: usize,
    /// Share of the pool kept back when splitting withdrawals
    pub common_pool_weight: f64,
    pub expected_contribution: Score,
    pub audit_cost: Score,
    pub punishment_percent: u32,
    /// Chair pairs tried before giving up
    pub max_chair_attempts: u32,
}

impl Default for RankBoundaryParams {
    fn default() -> Self {
        Self {
            initial_boundaries: DEFAULT_RANK_BOUNDARIES,
            queue_capacity: 5,
            common_pool_weight: 5.0,
            expected_contribution: 1,
            audit_cost: 5,
            punishment_percent: 25,
            max_chair_attempts: 10,
        }
    }
}

/// Withdrawal weight of a tier boundary
fn boundary_weight(boundary: Score) -> f64 {
    boundary as f64 / 10.0
}

#[derive(Debug, Clone)]
pub struct RankBoundaryRule {
    params: RankBoundaryParams,
    ranks: BTreeMap<AgentId, u32>,
    boundaries: RankBoundaries,
    contributions: BTreeMap<AgentId, LeakyQueue>,
    contribution_flags: BTreeMap<AgentId, bool>,
    withdrawal_flags: BTreeMap<AgentId, bool>,
}

impl RankBoundaryRule {
    pub fn new(params: RankBoundaryParams) -> Self {
        let mut boundaries = params.initial_boundaries;
        enforce_monotonic(&mut boundaries);
        Self {
            params,
            ranks: BTreeMap::new(),
            boundaries,
            contributions: BTreeMap::new(),
            contribution_flags: BTreeMap::new(),
            withdrawal_flags: BTreeMap::new(),
        }
    }

    pub fn boundaries(&self) -> RankBoundaries {
        self.boundaries
    }

    pub fn rank(&self, agent: &AgentId) -> u32 {
        self.ranks.get(agent).copied().unwrap_or(MIN_RANK)
    }

    pub fn set_rank(&mut self, agent: AgentId, rank: u32) {
        self.ranks.insert(agent, rank.clamp(MIN_RANK, MAX_RANK));
    }

    /// Sum of the agent's remembered contributions
    pub fn contribution_total(&self, agent: &AgentId) -> Score {
        self.contributions.get(agent).map(LeakyQueue::sum).unwrap_or(0)
    }

    fn tier_boundary(&self, rank: u32) -> Score {
        let index = rank.clamp(MIN_RANK, MAX_RANK) as usize - 1;
        self.boundaries[index]
    }

    /// Rank the agent earns this turn: the highest tier whose boundary its
    /// contribution total reaches, moved at most one step from the current rank
    pub fn compute_new_rank(&self, agent: &AgentId) -> u32 {
        let total = self.contribution_total(agent);
        let earned = self
            .boundaries
            .iter()
            .rposition(|boundary| total >= *boundary)
            .map(|index| index as u32 + 1)
            .unwrap_or(0);

        let current = self.rank(agent);
        earned
            .clamp(current.saturating_sub(1), current + 1)
            .clamp(MIN_RANK, MAX_RANK)
    }

    fn computed_ranks(&self, members: &[AgentId]) -> BTreeMap<AgentId, u32> {
        members.iter().map(|m| (*m, self.compute_new_rank(m))).collect()
    }

    /// Two distinct chairs drawn with probability proportional to rank
    pub fn select_chairs(
        &self,
        members: &[AgentId],
        rng: &mut StdRng,
    ) -> Result<Vec<AgentId>, GovernanceError> {
        let weighted: Vec<(AgentId, u64)> = members
            .iter()
            .map(|m| (*m, u64::from(self.rank(m))))
            .collect();
        weighted_sample(&weighted, CHAIRS, rng)
    }

    fn demote(&mut self, chairs: &[AgentId]) {
        for chair in chairs {
            let rank = self.rank(chair);
            self.ranks.insert(*chair, rank.saturating_sub(1).max(MIN_RANK));
        }
    }

    /// Gather every member's proposal, build the quartile candidates, gather
    /// ranked ballots and pick the Condorcet winner. Both chairs of an attempt
    /// count the same proposals and ballots.
    fn boundary_vote(&self, ctx: &mut GovernanceContext<'_>) -> Result<RankBoundaries, GovernanceError> {
        let view = ctx.view(GovernanceKind::RankBoundary);
        let proposals: Vec<RankBoundaries> = ctx
            .roster
            .gather(ctx.members, view, |source, c| source.boundary_proposal(c))
            .into_values()
            .flatten()
            .collect();

        let candidates = generate_candidates(&proposals)?;
        let ballots: Vec<_> = ctx
            .roster
            .gather(ctx.members, view, |source, c| source.boundary_ballot(c, &candidates))
            .into_values()
            .flatten()
            .collect();
        Ok(candidates[resolve_boundary_ballots(&ballots)])
    }

    /// What a chair claims the vote produced
    fn chair_report(
        &self,
        chair: AgentId,
        agreed: RankBoundaries,
        ctx: &mut GovernanceContext<'_>,
    ) -> RankBoundaries {
        let view = ctx.view(GovernanceKind::RankBoundary);
        ctx.roster
            .ask(chair, view, |source, c| source.chair_boundary_report(c, agreed))
            .unwrap_or(agreed)
    }
}

impl GovernanceRule for RankBoundaryRule {
    fn kind(&self) -> GovernanceKind {
        GovernanceKind::RankBoundary
    }

    fn sync_members(&mut self, members: &[AgentId]) {
        let capacity = self.params.queue_capacity;
        for member in members {
            self.ranks.entry(*member).or_insert(MIN_RANK);
            self.contributions
                .entry(*member)
                .or_insert_with(|| LeakyQueue::new(capacity));
        }
        self.ranks.retain(|agent, _| members.contains(agent));
        self.contributions.retain(|agent, _| members.contains(agent));
        self.contribution_flags.retain(|agent, _| members.contains(agent));
        self.withdrawal_flags.retain(|agent, _| members.contains(agent));
    }

    fn expected_contribution(&self, _agent: AgentId, _score: Score) -> Score {
        self.params.expected_contribution
    }

    /// Share of the pool weighted by the agent's tier boundary
    fn expected_withdrawal(&self, agent: AgentId, _score: Score, common_pool: Score) -> Score {
        let total_weight: f64 = self
            .ranks
            .values()
            .map(|rank| boundary_weight(self.tier_boundary(*rank)))
            .sum();
        let denominator = total_weight + self.params.common_pool_weight;
        if denominator <= 0.0 {
            return 0;
        }
        let agent_weight = boundary_weight(self.tier_boundary(self.rank(&agent)));
        (agent_weight * common_pool.max(0) as f64 / denominator) as Score
    }

    fn record_contribution_audit(&mut self, agent: AgentId, _score: Score, actual: Score, stated: Score) {
        self.contribution_flags.insert(agent, stated > actual);
        let capacity = self.params.queue_capacity;
        self.contributions
            .entry(agent)
            .or_insert_with(|| LeakyQueue::new(capacity))
            .push(stated);
    }

    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.contribution_flags.remove(&agent).unwrap_or(false)
    }

    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        score: Score,
        actual: Score,
        stated: Score,
        common_pool: Score,
    ) {
        let allowed = self.expected_withdrawal(agent, score, common_pool);
        self.withdrawal_flags
            .insert(agent, actual > stated || actual > allowed);
    }

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.withdrawal_flags.remove(&agent).unwrap_or(false)
    }

    fn audit_cost(&self, _common_pool: Score) -> Score {
        self.params.audit_cost
    }

    /// Audit only if the summed intent is positive; the most named target wins,
    /// earliest ballot breaks ties
    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId> {
        let intent: i64 = votes.iter().map(|v| i64::from(v.is_vote)).sum();
        if intent <= 0 {
            return None;
        }

        let mut counts: Vec<(AgentId, u32)> = Vec::new();
        for vote in votes.iter().filter(|v| v.is_vote == 1 && !v.voted_for.is_nil()) {
            match counts.iter_mut().find(|(target, _)| *target == vote.voted_for) {
                Some((_, count)) => *count += 1,
                None => counts.push((vote.voted_for, 1)),
            }
        }

        let mut best: Option<(AgentId, u32)> = None;
        for (target, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((target, count));
            }
        }
        best.map(|(target, _)| target)
    }

    /// Highest rank first; equal ranks keep their relative order
    fn withdrawal_order(&self, agents: &[AgentId], _rng: &mut StdRng) -> Vec<AgentId> {
        let mut order = agents.to_vec();
        order.sort_by(|a, b| self.rank(b).cmp(&self.rank(a)));
        order
    }

    fn punishment(&self, score: Score, _agent: AgentId) -> Score {
        percent_of(score, self.params.punishment_percent)
    }

    /// Renegotiate the boundaries
    fn run_pre_iteration(&mut self, ctx: &mut GovernanceContext<'_>) -> Result<(), GovernanceError> {
        if ctx.members.len() < CHAIRS {
            debug!("{} too small to elect chairs, boundaries kept", ctx.team_id);
            return Ok(());
        }

        for attempt in 1..=self.params.max_chair_attempts {
            let chairs = self.select_chairs(ctx.members, ctx.rng)?;
            let tallied = self.boundary_vote(ctx)?;
            let mut results = Vec::with_capacity(CHAIRS);
            for chair in &chairs {
                results.push(self.chair_report(*chair, tallied, ctx));
            }

            if results.windows(2).all(|w| w[0] == w[1]) {
                let mut agreed = results[0];
                enforce_monotonic(&mut agreed);
                self.boundaries = agreed;
                info!(
                    "📏 {} agreed rank boundaries {:?} (attempt {})",
                    ctx.team_id, agreed, attempt
                );
                return Ok(());
            }

            debug!("Chairs disagree on boundaries in {}, demoting both", ctx.team_id);
            self.demote(&chairs);
        }

        warn!(
            "Rank boundaries unchanged in {}: chairs never agreed in {} attempts",
            ctx.team_id, self.params.max_chair_attempts
        );
        Ok(())
    }

    /// Chairs recompute every member's rank from recent contributions
    fn run_post_contribution(&mut self, ctx: &mut GovernanceContext<'_>) -> Result<(), GovernanceError> {
        if ctx.members.len() < CHAIRS {
            let computed = self.computed_ranks(ctx.members);
            for (agent, rank) in computed {
                self.set_rank(agent, rank);
            }
            return Ok(());
        }

        let view = ctx.view(GovernanceKind::RankBoundary);
        for _ in 0..self.params.max_chair_attempts {
            let chairs = self.select_chairs(ctx.members, ctx.rng)?;
            let computed = self.computed_ranks(ctx.members);

            let reports: Vec<BTreeMap<AgentId, u32>> = chairs
                .iter()
                .map(|chair| {
                    ctx.roster
                        .ask(*chair, view, |source, c| source.chair_rank_report(c, &computed))
                        .unwrap_or_else(|| computed.clone())
                })
                .collect();

            if reports.windows(2).all(|w| w[0] == w[1]) {
                for (agent, rank) in &reports[0] {
                    if ctx.members.contains(agent) {
                        self.set_rank(*agent, *rank);
                    }
                }
                return Ok(());
            }

            self.demote(&chairs);
        }

        warn!("Ranks unchanged in {}: chairs never agreed", ctx.team_id);
        Ok(())
    }
}
