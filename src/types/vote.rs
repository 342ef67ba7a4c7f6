// Vote - Immutable ballot primitive shared by every tally
use super::primitives::AgentId;
use serde::{Deserialize, Serialize};

/// Intent carried by a vote
/// 1 = wants the action (audit, approval), 0 = indifferent, -1 = against.
/// Richer intensities are allowed; tallies only look at the sign.
pub type VoteIntent = i32;

/// A single ballot cast in one decision round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Intent (see `VoteIntent`)
    pub is_vote: VoteIntent,

    /// Who cast it
    pub voter: AgentId,

    /// Who it targets (`AgentId::NIL` for "nobody")
    pub voted_for: AgentId,

    /// How many turns the voter wants an audit to look back over
    pub audit_duration: u32,
}

impl Vote {
    pub fn new(is_vote: VoteIntent, voter: AgentId, voted_for: AgentId) -> Self {
        Self {
            is_vote,
            voter,
            voted_for,
            audit_duration: 0,
        }
    }

    pub fn with_duration(mut self, audit_duration: u32) -> Self {
        self.audit_duration = audit_duration;
        self
    }

    /// Abstention from `voter`
    pub fn abstain(voter: AgentId) -> Self {
        Self::new(0, voter, AgentId::NIL)
    }

    /// True when the ballot is in favour of acting against `voted_for`
    pub fn is_in_favour(&self) -> bool {
        self.is_vote >= 1 && !self.voted_for.is_nil()
    }
}

/// Mean audit duration requested by a set of votes (0 for no votes)
pub fn mean_audit_duration(votes: &[Vote]) -> u32 {
    if votes.is_empty() {
        return 0;
    }
    let total: u64 = votes.iter().map(|v| v.audit_duration as u64).sum();
    (total / votes.len() as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstain_is_not_in_favour() {
        let vote = Vote::abstain(AgentId::from_u128(1));
        assert!(!vote.is_in_favour());
    }

    #[test]
    fn test_nil_target_is_not_in_favour() {
        let vote = Vote::new(1, AgentId::from_u128(1), AgentId::NIL);
        assert!(!vote.is_in_favour());
    }

    #[test]
    fn test_mean_audit_duration() {
        let a = AgentId::from_u128(1);
        let votes = vec![
            Vote::new(1, a, a).with_duration(3),
            Vote::new(0, a, a).with_duration(4),
        ];
        assert_eq!(mean_audit_duration(&votes), 3);
        assert_eq!(mean_audit_duration(&[]), 0);
    }
}
