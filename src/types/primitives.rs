// Primitives - Minimal fundamental types of the simulation
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Score / resource amount (scores, pool balances, contributions)
/// Signed so intermediate arithmetic never wraps; callers clamp at 0.
pub type Score = i64;

/// Iteration number (teams reselect their governance rule at each iteration)
pub type IterationNumber = u32;

/// Turn number inside an iteration
pub type TurnNumber = u32;

/// Five ascending contribution thresholds, one per rank tier
pub type RankBoundaries = [Score; 5];

/// Boundaries every rank-boundary team starts from
pub const DEFAULT_RANK_BOUNDARIES: RankBoundaries = [10, 20, 30, 40, 50];

/// Agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Sentinel "nobody" id
    pub const NIL: AgentId = AgentId(Uuid::nil());

    pub fn from_u128(value: u128) -> Self {
        AgentId(Uuid::from_u128(value))
    }

    /// Draw a fresh id from the injected random source
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        AgentId(uuid::Builder::from_random_bytes(rng.gen()).into_uuid())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // First 8 hex chars are enough to tell agents apart in logs
        let simple = self.0.simple().to_string();
        write!(f, "agent:{}", &simple[..8])
    }
}

/// Team identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "team:{}", self.0)
    }
}

/// Percentage of a score, rounded down (`score * percent / 100`)
pub fn percent_of(score: Score, percent: u32) -> Score {
    score.max(0).saturating_mul(percent as Score) / 100
}
