// Leader - One elected member with double weight and a larger share
// Principle: Offences accumulate to a hard cap; reaching it means expulsion
//
// A share of the pool is held in reserve; the rest is split so that the
// leader counts `leader_multiplier` citizens. Audits targeting the leader
// count double. A leader caught cheating, or gone from the team, is replaced
// by a plurality election among the remaining members.

use super::audit_record::AuditRecord;
use super::{GovernanceContext, GovernanceError, GovernanceKind, GovernanceRule, Leadership};
use crate::types::{percent_of, AgentId, Score, Vote};
use crate::voting::{top_reaching, weighted_tally};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Leader rule tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderParams {
    /// Fraction of the pool nobody may draw on
    pub reserve_fraction: f64,
    /// How many citizen shares the leader receives
    pub leader_multiplier: f64,
    /// Withdrawal tolerated above the share, as a fraction of score (citizens)
    pub citizen_allowance: f64,
    /// Same, for the leader
    pub leader_allowance: f64,
    pub punishment_percent: u32,
    /// Offences that get a member expelled
    pub max_offences: u32,
    pub audit_cost_per_turn: Score,
}

impl Default for LeaderParams {
    fn default() -> Self {
        Self {
            reserve_fraction: 0.15,
            leader_multiplier: 2.0,
            citizen_allowance: 0.10,
            leader_allowance: 0.25,
            punishment_percent: 25,
            max_offences: 3,
            audit_cost_per_turn: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaderRule {
    params: LeaderParams,
    leader: Option<AgentId>,
    members: Vec<AgentId>,
    offences: BTreeMap<AgentId, u32>,
    audit: AuditRecord,
    to_expel: Vec<AgentId>,
}

impl LeaderRule {
    pub fn new(params: LeaderParams, audit_window: usize) -> Self {
        let audit = AuditRecord::new(audit_window, params.audit_cost_per_turn);
        Self {
            params,
            leader: None,
            members: Vec::new(),
            offences: BTreeMap::new(),
            audit,
            to_expel: Vec::new(),
        }
    }

    pub fn offences(&self, agent: &AgentId) -> u32 {
        self.offences.get(agent).copied().unwrap_or(0)
    }

    fn is_leader(&self, agent: &AgentId) -> bool {
        self.leader.as_ref() == Some(agent)
    }

    /// Read and clear the agent's window, converting infractions into offences
    fn consume_audit(&mut self, agent: AgentId) -> bool {
        let warnings = self.audit.take_infractions(&agent);
        let offences = self
            .offences(&agent)
            .saturating_add(warnings)
            .min(self.params.max_offences);
        self.offences.insert(agent, offences);

        if offences >= self.params.max_offences && !self.to_expel.contains(&agent) {
            self.to_expel.push(agent);
        }
        warnings > 0
    }
}

impl GovernanceRule for LeaderRule {
    fn kind(&self) -> GovernanceKind {
        GovernanceKind::Leader
    }

    fn sync_members(&mut self, members: &[AgentId]) {
        self.members = members.to_vec();
        self.offences.retain(|agent, _| members.contains(agent));
        self.audit.retain(members);
        self.to_expel.retain(|agent| members.contains(agent));
        if let Some(leader) = self.leader {
            if !members.contains(&leader) {
                self.leader = None;
            }
        }
    }

    fn expected_contribution(&self, _agent: AgentId, score: Score) -> Score {
        score
    }

    fn expected_withdrawal(&self, agent: AgentId, _score: Score, common_pool: Score) -> Score {
        let count = self.members.len();
        if count == 0 {
            return 0;
        }
        let pool = common_pool.max(0) as f64;
        let available = pool - pool * self.params.reserve_fraction;

        let led = self.leader.map_or(false, |l| self.members.contains(&l));
        let shares = if led {
            self.params.leader_multiplier + (count - 1) as f64
        } else {
            count as f64
        };
        if shares <= 0.0 {
            return 0;
        }

        let weight = if self.is_leader(&agent) {
            self.params.leader_multiplier
        } else {
            1.0
        };
        (available * weight / shares) as Score
    }

    fn record_contribution_audit(&mut self, agent: AgentId, _score: Score, actual: Score, stated: Score) {
        self.audit.add_record(agent, actual != stated);
    }

    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_audit(agent)
    }

    /// Lying, or taking more than both the share and the role allowance, is one infraction per turn
    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        score: Score,
        actual: Score,
        stated: Score,
        common_pool: Score,
    ) {
        let fraction = if self.is_leader(&agent) {
            self.params.leader_allowance
        } else {
            self.params.citizen_allowance
        };
        let tolerated = (score.max(0) as f64 * fraction) as Score;
        let allowance = self
            .expected_withdrawal(agent, score, common_pool)
            .max(tolerated);

        let infraction = actual != stated || actual > allowance;
        if infraction && self.audit.get_last_record(&agent).unwrap_or(0) == 0 {
            self.audit.increment_last_record(agent);
        }
    }

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_audit(agent)
    }

    fn audit_cost(&self, _common_pool: Score) -> Score {
        self.audit.audit_cost()
    }

    /// Votes naming the leader count (and weigh the window) double; a target
    /// needs an absolute majority of the team
    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId> {
        if votes.is_empty() {
            return None;
        }

        let weight_of = |v: &Vote| if self.is_leader(&v.voted_for) { 2 } else { 1 };
        let duration: u64 = votes
            .iter()
            .map(|v| u64::from(v.audit_duration) * weight_of(v) as u64)
            .sum();
        let tally = weighted_tally(votes, |v| weight_of(v));

        self.audit
            .set_audit_duration((duration / votes.len() as u64) as usize);

        let count = if self.members.is_empty() {
            votes.len()
        } else {
            self.members.len()
        };
        top_reaching(&tally, (count / 2 + 1) as i64)
    }

    /// Leader first, everybody else shuffled
    fn withdrawal_order(&self, agents: &[AgentId], rng: &mut StdRng) -> Vec<AgentId> {
        let mut others: Vec<AgentId> = agents
            .iter()
            .filter(|a| !self.is_leader(a))
            .copied()
            .collect();
        others.shuffle(rng);

        let mut order = Vec::with_capacity(agents.len());
        if let Some(leader) = self.leader.filter(|l| agents.contains(l)) {
            order.push(leader);
        }
        order.extend(others);
        order
    }

    fn punishment(&self, score: Score, _agent: AgentId) -> Score {
        percent_of(score, self.params.punishment_percent)
    }

    fn run_pre_iteration(&mut self, ctx: &mut GovernanceContext<'_>) -> Result<(), GovernanceError> {
        if self.leader.is_none() {
            hold_election(self, ctx);
        }
        Ok(())
    }

    fn members_to_expel(&mut self) -> Vec<AgentId> {
        std::mem::take(&mut self.to_expel)
    }

    fn as_leadership(&mut self) -> Option<&mut dyn Leadership> {
        Some(self)
    }
}

impl Leadership for LeaderRule {
    fn leader(&self) -> Option<AgentId> {
        self.leader
    }

    fn install(&mut self, leader: AgentId) {
        self.leader = Some(leader);
    }

    fn depose(&mut self) {
        self.leader = None;
    }
}

/// Plurality vote among living members; ties and silence are settled by the RNG
pub fn elect_leader(ctx: &mut GovernanceContext<'_>) -> Option<AgentId> {
    if ctx.members.is_empty() {
        return None;
    }

    let view = ctx.view(GovernanceKind::Leader);
    let members = ctx.members;
    let ballots = ctx
        .roster
        .gather(members, view, |source, c| source.leader_vote(c, members));

    let mut tally: BTreeMap<AgentId, u32> = BTreeMap::new();
    for choice in ballots.values().flatten() {
        if members.contains(choice) {
            *tally.entry(*choice).or_insert(0) += 1;
        }
    }

    let top = tally.values().copied().max().unwrap_or(0);
    let tied: Vec<AgentId> = if top == 0 {
        members.to_vec()
    } else {
        tally
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(agent, _)| *agent)
            .collect()
    };
    tied.choose(&mut *ctx.rng).copied()
}

/// Depose any sitting leader, elect a new one and tell the team
pub fn hold_election(rule: &mut dyn Leadership, ctx: &mut GovernanceContext<'_>) -> Option<AgentId> {
    rule.depose();
    let elected = elect_leader(ctx);
    if let Some(leader) = elected {
        rule.install(leader);
        info!("👑 {} elected leader of {}", leader, ctx.team_id);
    }
    ctx.roster
        .broadcast(ctx.members, AgentId::NIL, |source| source.leader_changed(elected));
    elected
}
