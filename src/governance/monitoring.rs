// Monitoring - Escalating scrutiny of caught cheaters
// Principle: Every caught cheat raises the stage, every clean turn lowers it
//
// Stage 0 means unmonitored (no entry). Stages 1..=3 force a larger
// contribution and a smaller withdrawal. A monitored agent that cheats again
// may be detected at turn end (raising its stage) or slip through (lowering it);
// cheating at stage 3 is always detected and ends in expulsion.
// Voting power follows decayed contributions.

use super::{GovernanceKind, GovernanceRule};
use crate::types::{AgentId, Score, Vote};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Highest stage an agent can be monitored at
pub const MAX_STAGE: u32 = 3;

/// Stage signalling expulsion
pub const EXPEL_STAGE: u32 = MAX_STAGE + 1;

/// Audit share of voting power an agent needs to be audited
pub const AUDIT_POWER_THRESHOLD: f64 = 0.5;

/// Entries kept per agent
pub const HISTORY_LIMIT: usize = 64;

/// Monitoring rule tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringParams {
    /// Share of score expected as contribution
    pub contribution_fraction: f64,
    /// Weight of the current turn in voting power
    pub current_weight: f64,
    /// Decay of the cumulative contribution per turn
    pub decay: f64,
    /// Share of the pool charged per audit
    pub audit_cost_fraction: f64,
    /// Contribution multiplier at stages 1, 2, 3
    pub contribution_multipliers: [f64; 3],
    /// Withdrawal multiplier at stages 1, 2, 3
    pub withdrawal_multipliers: [f64; 3],
    /// Turns looked back when sizing a punishment
    pub punishment_window: usize,
    pub min_punishment: f64,
    pub max_punishment: f64,
}

impl Default for MonitoringParams {
    fn default() -> Self {
        Self {
            contribution_fraction: 0.3,
            current_weight: 0.4,
            decay: 0.9,
            audit_cost_fraction: 0.1,
            contribution_multipliers: [1.5, 2.0, 3.0],
            withdrawal_multipliers: [0.75, 0.5, 0.0],
            punishment_window: 4,
            min_punishment: 0.25,
            max_punishment: 0.75,
        }
    }
}

/// One cheat as seen by the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatingRecord {
    pub expected: Score,
    pub actual: Score,
    pub cheated_amount: Score,
}

#[derive(Debug, Clone)]
pub struct MonitoringRule {
    params: MonitoringParams,
    members: Vec<AgentId>,
    current: BTreeMap<AgentId, f64>,
    cumulative: BTreeMap<AgentId, f64>,
    /// `None` for an honest action
    history: BTreeMap<AgentId, Vec<Option<CheatingRecord>>>,
    /// Entries before this index have been audited
    audited_upto: BTreeMap<AgentId, usize>,
    stages: BTreeMap<AgentId, u32>,
    /// Largest cheat of the turn per agent, cleared at turn end
    turn_cheats: BTreeMap<AgentId, CheatingRecord>,
    /// Put under monitoring by an audit this turn
    newly_monitored: BTreeSet<AgentId>,
    to_expel: Vec<AgentId>,
}

impl MonitoringRule {
    pub fn new(params: MonitoringParams) -> Self {
        Self {
            params,
            members: Vec::new(),
            current: BTreeMap::new(),
            cumulative: BTreeMap::new(),
            history: BTreeMap::new(),
            audited_upto: BTreeMap::new(),
            stages: BTreeMap::new(),
            turn_cheats: BTreeMap::new(),
            newly_monitored: BTreeSet::new(),
            to_expel: Vec::new(),
        }
    }

    /// 0 when unmonitored
    pub fn stage(&self, agent: &AgentId) -> u32 {
        self.stages.get(agent).copied().unwrap_or(0)
    }

    pub fn monitored(&self) -> impl Iterator<Item = (&AgentId, &u32)> {
        self.stages.iter()
    }

    /// Share of the team's weighted contribution held by each member, summing to 1
    pub fn voting_power(&self) -> BTreeMap<AgentId, f64> {
        let w = self.params.current_weight;
        let weighted: BTreeMap<AgentId, f64> = self
            .current
            .iter()
            .map(|(agent, current)| {
                let cumulative = self.cumulative.get(agent).copied().unwrap_or(0.0);
                (*agent, w * current + (1.0 - w) * cumulative)
            })
            .collect();

        let total: f64 = weighted.values().sum();
        weighted
            .into_iter()
            .map(|(agent, value)| {
                let power = if total > 0.0 { value / total } else { 0.0 };
                (agent, power)
            })
            .collect()
    }

    fn multiplier(table: &[f64; 3], stage: u32) -> f64 {
        match stage {
            0 => 1.0,
            s => table[(s.min(MAX_STAGE) - 1) as usize],
        }
    }

    fn record(&mut self, agent: AgentId, entry: Option<CheatingRecord>) {
        let entries = self.history.entry(agent).or_default();
        entries.push(entry);
        if entries.len() > HISTORY_LIMIT {
            entries.remove(0);
            if let Some(upto) = self.audited_upto.get_mut(&agent) {
                *upto = upto.saturating_sub(1);
            }
        }

        if let Some(cheat) = entry {
            let worst = self.turn_cheats.entry(agent).or_insert(cheat);
            if cheat.cheated_amount > worst.cheated_amount {
                *worst = cheat;
            }
        }
    }

    /// Read the newest entry if not yet audited; a cheat puts an
    /// unmonitored agent on stage 1
    fn consume_latest(&mut self, agent: AgentId) -> bool {
        let Some(entries) = self.history.get(&agent) else {
            return false;
        };
        let len = entries.len();
        let upto = self.audited_upto.get(&agent).copied().unwrap_or(0);
        let cheated = len > upto && matches!(entries.last(), Some(Some(_)));
        self.audited_upto.insert(agent, len);

        if cheated && !self.stages.contains_key(&agent) {
            self.stages.insert(agent, 1);
            self.newly_monitored.insert(agent);
            info!("🔍 {} placed under monitoring", agent);
        }
        cheated
    }

    /// Chance a Poisson draw with rate `cheated * stage / MAX_STAGE` is non-zero
    fn detected(cheat: &CheatingRecord, stage: u32, rng: &mut StdRng) -> bool {
        let lambda = cheat.cheated_amount.max(0) as f64 * f64::from(stage) / f64::from(MAX_STAGE);
        rng.gen::<f64>() >= (-lambda).exp()
    }
}

impl GovernanceRule for MonitoringRule {
    fn kind(&self) -> GovernanceKind {
        GovernanceKind::Monitoring
    }

    fn sync_members(&mut self, members: &[AgentId]) {
        self.members = members.to_vec();
        self.current.retain(|agent, _| members.contains(agent));
        self.cumulative.retain(|agent, _| members.contains(agent));
        self.history.retain(|agent, _| members.contains(agent));
        self.audited_upto.retain(|agent, _| members.contains(agent));
        self.stages.retain(|agent, _| members.contains(agent));
        self.turn_cheats.retain(|agent, _| members.contains(agent));
        self.to_expel.retain(|agent| members.contains(agent));
    }

    fn expected_contribution(&self, agent: AgentId, score: Score) -> Score {
        let base = (score.max(0) as f64 * self.params.contribution_fraction) as Score;
        let multiplier = Self::multiplier(&self.params.contribution_multipliers, self.stage(&agent));
        (base as f64 * multiplier) as Score
    }

    fn expected_withdrawal(&self, agent: AgentId, _score: Score, common_pool: Score) -> Score {
        if self.members.is_empty() {
            return 0;
        }
        let available = (common_pool - self.audit_cost(common_pool)).max(0);
        let base = available / self.members.len() as Score;
        let multiplier = Self::multiplier(&self.params.withdrawal_multipliers, self.stage(&agent));
        (base as f64 * multiplier) as Score
    }

    /// Falling short of the expected share is a cheat; stated amounts are not trusted
    fn record_contribution_audit(&mut self, agent: AgentId, score: Score, actual: Score, _stated: Score) {
        self.current.insert(agent, actual as f64);
        let previous = self.cumulative.get(&agent).copied().unwrap_or(0.0);
        self.cumulative
            .insert(agent, previous * self.params.decay + actual as f64);

        let expected = self
            .expected_contribution(agent, score)
            .min(score.max(0));
        let entry = (actual < expected).then(|| CheatingRecord {
            expected,
            actual,
            cheated_amount: expected - actual,
        });
        self.record(agent, entry);
    }

    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_latest(agent)
    }

    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        score: Score,
        actual: Score,
        _stated: Score,
        common_pool: Score,
    ) {
        let expected = self.expected_withdrawal(agent, score, common_pool);
        let entry = (actual > expected).then(|| CheatingRecord {
            expected,
            actual,
            cheated_amount: actual - expected,
        });
        self.record(agent, entry);
    }

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.consume_latest(agent)
    }

    fn audit_cost(&self, common_pool: Score) -> Score {
        ((common_pool.max(0) as f64 * self.params.audit_cost_fraction) as Score).max(1)
    }

    /// Highest voting power above one half; ties go to the smallest id
    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId> {
        let power = self.voting_power();
        let mut totals: BTreeMap<AgentId, f64> = BTreeMap::new();
        for vote in votes.iter().filter(|v| v.is_in_favour()) {
            *totals.entry(vote.voted_for).or_insert(0.0) +=
                power.get(&vote.voter).copied().unwrap_or(0.0);
        }

        let mut best: Option<(AgentId, f64)> = None;
        for (agent, total) in totals {
            if total > AUDIT_POWER_THRESHOLD && best.map_or(true, |(_, top)| total > top) {
                best = Some((agent, total));
            }
        }
        best.map(|(agent, _)| agent)
    }

    fn withdrawal_order(&self, agents: &[AgentId], rng: &mut StdRng) -> Vec<AgentId> {
        let mut order = agents.to_vec();
        order.shuffle(rng);
        order
    }

    /// Interpolated on recent cheats; any cheat in the window costs the maximum
    fn punishment(&self, score: Score, agent: AgentId) -> Score {
        let score = score.max(0);
        if self.stage(&agent) > MAX_STAGE {
            return score;
        }

        let window = self.params.punishment_window.max(1);
        let cheats = self
            .history
            .get(&agent)
            .map(|entries| {
                // two audited actions per turn
                let start = entries.len().saturating_sub(2 * window);
                entries[start..].iter().filter(|e| e.is_some()).count()
            })
            .unwrap_or(0);

        let min = self.params.min_punishment * score as f64;
        let max = self.params.max_punishment * score as f64;
        let mut deduction = min + (cheats as f64 / window as f64) * (max - min);
        if deduction > min {
            deduction = max;
        }
        (deduction as Score).min(score)
    }

    /// Clean turns lower the stage; cheats by monitored agents are checked
    fn end_of_turn(&mut self, rng: &mut StdRng) {
        let monitored: Vec<(AgentId, u32)> = self.stages.iter().map(|(a, s)| (*a, *s)).collect();

        for (agent, stage) in monitored {
            if self.newly_monitored.contains(&agent) || stage > MAX_STAGE {
                continue;
            }

            let next = match self.turn_cheats.get(&agent) {
                None => stage - 1,
                Some(_) if stage >= MAX_STAGE => EXPEL_STAGE,
                // Caught when a Poisson draw at rate cheated * stage / 3 is non-zero
                Some(cheat) if Self::detected(cheat, stage, rng) => stage + 1,
                Some(_) => stage - 1,
            };

            debug!("{} monitoring stage {} -> {}", agent, stage, next);
            if next == 0 {
                self.stages.remove(&agent);
            } else {
                self.stages.insert(agent, next);
            }
            if next == EXPEL_STAGE {
                info!("🚫 {} failed stage {} monitoring", agent, MAX_STAGE);
                self.to_expel.push(agent);
            }
        }

        self.turn_cheats.clear();
        self.newly_monitored.clear();
    }

    fn members_to_expel(&mut self) -> Vec<AgentId> {
        std::mem::take(&mut self.to_expel)
    }

    fn expulsion_penalty(&self, score: Score, agent: AgentId) -> Score {
        self.punishment(score, agent)
    }
}
