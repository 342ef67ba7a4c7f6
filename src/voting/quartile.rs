// Quartile - Boundary candidate generation from member proposals
// Principle: Every candidate comes out non-decreasing, whatever members propose

use crate::governance::GovernanceError;
use crate::types::{RankBoundaries, Score};

/// Index of the lower-quartile candidate
pub const LOWER_CANDIDATE: usize = 0;
/// Index of the median candidate (Condorcet fallback)
pub const MEDIAN_CANDIDATE: usize = 1;
/// Index of the upper-quartile candidate
pub const UPPER_CANDIDATE: usize = 2;

/// Median of an already sorted slice
///
/// Even length: mean of the two central values, halves rounded up.
/// Odd length: the central value. Empty: 0.
pub fn median(sorted: &[Score]) -> Score {
    let n = sorted.len();
    if n == 0 {
        return 0;
    }
    if n % 2 == 1 {
        return sorted[n / 2];
    }
    let sum = sorted[n / 2 - 1] + sorted[n / 2];
    (sum + 1).div_euclid(2)
}

/// (lower quartile, median, upper quartile) of an unsorted column
/// Quartiles are the medians of the lower and upper halves (the centre is
/// excluded for odd lengths). A half that is empty falls back to the median.
pub fn quartiles(column: &[Score]) -> (Score, Score, Score) {
    let mut sorted = column.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let mid = median(&sorted);

    let lower_half = &sorted[..n / 2];
    let upper_half = &sorted[(n + 1) / 2..];

    let lower = if lower_half.is_empty() { mid } else { median(lower_half) };
    let upper = if upper_half.is_empty() { mid } else { median(upper_half) };
    (lower, mid, upper)
}

/// Raise every tier to at least the tier below it
pub fn enforce_monotonic(boundaries: &mut RankBoundaries) {
    for tier in 1..boundaries.len() {
        if boundaries[tier] < boundaries[tier - 1] {
            boundaries[tier] = boundaries[tier - 1];
        }
    }
}

/// Lower, median and upper candidate vectors from per-member proposals
pub fn generate_candidates(
    proposals: &[RankBoundaries],
) -> Result<[RankBoundaries; 3], GovernanceError> {
    if proposals.is_empty() {
        return Err(GovernanceError::NoProposals);
    }

    let mut candidates = [[0 as Score; 5]; 3];
    for tier in 0..5 {
        let column: Vec<Score> = proposals.iter().map(|p| p[tier]).collect();
        let (lower, mid, upper) = quartiles(&column);
        candidates[LOWER_CANDIDATE][tier] = lower;
        candidates[MEDIAN_CANDIDATE][tier] = mid;
        candidates[UPPER_CANDIDATE][tier] = upper;
    }

    for candidate in candidates.iter_mut() {
        enforce_monotonic(candidate);
    }
    Ok(candidates)
}
