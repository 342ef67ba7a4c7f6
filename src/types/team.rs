// Team - Member list, common pool and the governance rule bound for the iteration
// Principle: The pool never goes negative; withdrawals are clamped, not refused

use super::primitives::{AgentId, Score, TeamId};
use crate::governance::{GovernanceKind, GovernanceRule};

/// A team of agents sharing one common pool
#[derive(Debug)]
pub struct Team {
    /// Team identifier
    pub id: TeamId,

    /// Ordered member list (insertion order, no duplicates)
    pub members: Vec<AgentId>,

    /// Shared resource balance (always >= 0)
    pub common_pool: Score,

    /// Active rule for the current iteration
    pub governance: Box<dyn GovernanceRule>,
}

impl Team {
    pub fn new(id: TeamId, members: Vec<AgentId>, governance: Box<dyn GovernanceRule>) -> Self {
        let mut team = Self {
            id,
            members: Vec::with_capacity(members.len()),
            common_pool: 0,
            governance,
        };
        for member in members {
            team.add_member(member);
        }
        team
    }

    pub fn kind(&self) -> GovernanceKind {
        self.governance.kind()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.members.contains(agent)
    }

    /// Add a member; returns false if already present
    pub fn add_member(&mut self, agent: AgentId) -> bool {
        if self.contains(&agent) {
            return false;
        }
        self.members.push(agent);
        self.governance.sync_members(&self.members);
        true
    }

    /// Remove a member; returns false if it was not on the team
    pub fn remove_member(&mut self, agent: &AgentId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != agent);
        if before == self.members.len() {
            return false;
        }
        self.governance.sync_members(&self.members);
        true
    }

    /// Credit the pool (negative amounts are ignored)
    pub fn credit(&mut self, amount: Score) {
        self.common_pool = self.common_pool.saturating_add(amount.max(0));
    }

    /// Take up to `requested` from the pool, returns what was actually taken
    pub fn withdraw(&mut self, requested: Score) -> Score {
        let taken = requested.clamp(0, self.common_pool);
        self.common_pool -= taken;
        taken
    }

    /// Iteration boundary: the pool does not carry over
    pub fn reset_pool(&mut self) {
        self.common_pool = 0;
    }

    /// Swap in a freshly selected rule
    pub fn bind_governance(&mut self, governance: Box<dyn GovernanceRule>) {
        self.governance = governance;
        self.governance.sync_members(&self.members);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::fixed::FixedRule;

    fn setup() -> Team {
        let members = (1..=3).map(AgentId::from_u128).collect();
        Team::new(TeamId(1), members, Box::new(FixedRule::default()))
    }

    #[test]
    fn test_withdraw_is_clamped() {
        let mut team = setup();
        team.credit(5);
        assert_eq!(team.withdraw(10), 5);
        assert_eq!(team.common_pool, 0);
        assert_eq!(team.withdraw(3), 0);
    }

    #[test]
    fn test_negative_amounts_ignored() {
        let mut team = setup();
        team.credit(-4);
        assert_eq!(team.common_pool, 0);
        team.credit(4);
        assert_eq!(team.withdraw(-1), 0);
        assert_eq!(team.common_pool, 4);
    }

    #[test]
    fn test_membership() {
        let mut team = setup();
        assert!(!team.add_member(AgentId::from_u128(1)));
        assert!(team.add_member(AgentId::from_u128(9)));
        assert_eq!(team.len(), 4);
        assert!(team.remove_member(&AgentId::from_u128(2)));
        assert!(!team.remove_member(&AgentId::from_u128(2)));
        assert_eq!(team.members[1], AgentId::from_u128(3));
    }
}
