// Tally - Threshold counting and weighted selection shared by the rules
// Principle: Iterate in key order so every tie-break is reproducible

use crate::governance::GovernanceError;
use crate::types::{AgentId, Vote};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

/// Weight accumulated per target by in-favour votes
pub fn weighted_tally<F>(votes: &[Vote], mut weight: F) -> BTreeMap<AgentId, i64>
where
    F: FnMut(&Vote) -> i64,
{
    let mut tally = BTreeMap::new();
    for vote in votes.iter().filter(|v| v.is_in_favour()) {
        *tally.entry(vote.voted_for).or_insert(0) += weight(vote);
    }
    tally
}

/// Target with the largest tally reaching `threshold`
/// Ties go to the smallest id.
pub fn top_reaching(tally: &BTreeMap<AgentId, i64>, threshold: i64) -> Option<AgentId> {
    let mut best: Option<(AgentId, i64)> = None;
    for (&target, &total) in tally {
        if total < threshold {
            continue;
        }
        match best {
            Some((_, current)) if current >= total => {}
            _ => best = Some((target, total)),
        }
    }
    best.map(|(target, _)| target)
}

/// Strict headcount majority: more than half of all ballots name the same target
pub fn headcount_majority(votes: &[Vote]) -> Option<AgentId> {
    let tally = weighted_tally(votes, |_| 1);
    let needed = votes.len() as i64 / 2 + 1;
    top_reaching(&tally, needed)
}

/// Pick one agent with probability proportional to its weight
pub fn weighted_choice(
    candidates: &[(AgentId, u64)],
    rng: &mut StdRng,
) -> Result<AgentId, GovernanceError> {
    if candidates.is_empty() {
        return Err(GovernanceError::NotEnoughAgents {
            requested: 1,
            available: 0,
        });
    }
    let total: u64 = candidates.iter().map(|(_, w)| *w).sum();
    if total == 0 {
        return Err(GovernanceError::ZeroTotalWeight);
    }

    let target = rng.gen_range(1..=total);
    let mut cumulative = 0u64;
    for &(agent, weight) in candidates {
        cumulative += weight;
        if cumulative >= target {
            return Ok(agent);
        }
    }
    // cumulative == total by now, so the loop always returns
    Err(GovernanceError::ZeroTotalWeight)
}

/// Pick `n` distinct agents, each draw weighted like `weighted_choice`
pub fn weighted_sample(
    candidates: &[(AgentId, u64)],
    n: usize,
    rng: &mut StdRng,
) -> Result<Vec<AgentId>, GovernanceError> {
    if candidates.len() < n {
        return Err(GovernanceError::NotEnoughAgents {
            requested: n,
            available: candidates.len(),
        });
    }

    let mut remaining = candidates.to_vec();
    let mut chosen = Vec::with_capacity(n);
    for _ in 0..n {
        let pick = weighted_choice(&remaining, rng)?;
        remaining.retain(|(agent, _)| *agent != pick);
        chosen.push(pick);
    }
    Ok(chosen)
}
