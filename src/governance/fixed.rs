// Fixed - Baseline rule: give everything, take a flat amount
// Principle: Simplest rule every other variant is compared against

use super::audit_record::AuditRecord;
use super::{GovernanceKind, GovernanceRule};
use crate::types::{mean_audit_duration, percent_of, AgentId, Score, Vote};
use crate::voting::headcount_majority;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Fixed rule tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedParams {
    /// Flat withdrawal per agent per turn
    pub expected_withdrawal: Score,
    /// Share of score taken from a caught cheater
    pub punishment_percent: u32,
    /// Audit cost per turn of look-back window
    pub audit_cost_per_turn: Score,
}

impl Default for FixedParams {
    fn default() -> Self {
        Self {
            expected_withdrawal: 2,
            punishment_percent: 25,
            audit_cost_per_turn: 1,
        }
    }
}

/// Expected contribution is the whole score; withdrawals are flat
#[derive(Debug, Clone)]
pub struct FixedRule {
    params: FixedParams,
    audit: AuditRecord,
}

impl Default for FixedRule {
    fn default() -> Self {
        Self::new(FixedParams::default(), super::audit_record::DEFAULT_AUDIT_WINDOW)
    }
}

impl FixedRule {
    pub fn new(params: FixedParams, audit_window: usize) -> Self {
        let audit = AuditRecord::new(audit_window, params.audit_cost_per_turn);
        Self { params, audit }
    }

    pub fn audit_record(&self) -> &AuditRecord {
        &self.audit
    }
}

impl GovernanceRule for FixedRule {
    fn kind(&self) -> GovernanceKind {
        GovernanceKind::Fixed
    }

    fn expected_contribution(&self, _agent: AgentId, score: Score) -> Score {
        score
    }

    fn expected_withdrawal(&self, _agent: AgentId, _score: Score, _common_pool: Score) -> Score {
        self.params.expected_withdrawal
    }

    fn record_contribution_audit(&mut self, agent: AgentId, _score: Score, actual: Score, stated: Score) {
        self.audit.add_record(agent, actual != stated);
    }

    fn contribution_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.audit.take_infractions(&agent) > 0
    }

    fn record_withdrawal_audit(
        &mut self,
        agent: AgentId,
        _score: Score,
        actual: Score,
        stated: Score,
        _common_pool: Score,
    ) {
        if actual != stated {
            self.audit.increment_last_record(agent);
        }
    }

    fn withdrawal_audit_outcome(&mut self, agent: AgentId) -> bool {
        self.audit.take_infractions(&agent) > 0
    }

    fn audit_cost(&self, _common_pool: Score) -> Score {
        self.audit.audit_cost()
    }

    /// The window follows the mean requested duration; a strict headcount majority picks the target
    fn resolve_vote(&mut self, votes: &[Vote]) -> Option<AgentId> {
        if !votes.is_empty() {
            self.audit.set_audit_duration(mean_audit_duration(votes) as usize);
        }
        headcount_majority(votes)
    }

    fn withdrawal_order(&self, agents: &[AgentId], rng: &mut StdRng) -> Vec<AgentId> {
        let mut order = agents.to_vec();
        order.shuffle(rng);
        order
    }

    fn punishment(&self, score: Score, _agent: AgentId) -> Score {
        percent_of(score, self.params.punishment_percent)
    }

    fn sync_members(&mut self, members: &[AgentId]) {
        self.audit.retain(members);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn setup() -> (FixedRule, AgentId) {
        (FixedRule::default(), AgentId::from_u128(7))
    }

    #[test]
    fn test_expected_amounts() {
        let (rule, agent) = setup();
        assert_eq!(rule.expected_contribution(agent, 10), 10);
        assert_eq!(rule.expected_withdrawal(agent, 10, 1), 2);
    }

    #[test]
    fn test_contribution_audit_consumes() {
        let (mut rule, agent) = setup();
        rule.record_contribution_audit(agent, 10, 5, 10);
        assert!(rule.contribution_audit_outcome(agent));
        assert!(!rule.contribution_audit_outcome(agent));
    }

    #[test]
    fn test_truthful_agent_passes() {
        let (mut rule, agent) = setup();
        rule.record_contribution_audit(agent, 10, 10, 10);
        rule.record_withdrawal_audit(agent, 10, 2, 2, 40);
        assert!(!rule.contribution_audit_outcome(agent));
        assert!(!rule.withdrawal_audit_outcome(agent));
    }

    #[test]
    fn test_withdrawal_lie_is_caught() {
        let (mut rule, agent) = setup();
        rule.record_contribution_audit(agent, 10, 10, 10);
        rule.record_withdrawal_audit(agent, 10, 5, 2, 40);
        assert!(rule.withdrawal_audit_outcome(agent));
        assert!(!rule.withdrawal_audit_outcome(agent));
    }

    #[test]
    fn test_vote_sets_window_and_needs_majority() {
        let (mut rule, target) = setup();
        let voters: Vec<AgentId> = (1..=4).map(AgentId::from_u128).collect();
        let votes: Vec<Vote> = voters
            .iter()
            .take(3)
            .map(|v| Vote::new(1, *v, target).with_duration(3))
            .chain(std::iter::once(Vote::abstain(voters[3]).with_duration(3)))
            .collect();
        assert_eq!(rule.resolve_vote(&votes), Some(target));
        assert_eq!(rule.audit_record().audit_duration(), 3);
        assert_eq!(rule.audit_cost(100), 3);

        let split = vec![Vote::new(1, voters[0], target), Vote::abstain(voters[1])];
        assert_eq!(rule.resolve_vote(&split), None);
    }

    #[test]
    fn test_punishment_and_order() {
        let (rule, agent) = setup();
        assert_eq!(rule.punishment(100, agent), 25);

        let mut rng = StdRng::seed_from_u64(4);
        let agents: Vec<AgentId> = (1..=6).map(AgentId::from_u128).collect();
        let mut order = rule.withdrawal_order(&agents, &mut rng);
        order.sort();
        assert_eq!(order, agents);
    }
}
