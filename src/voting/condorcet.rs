// Condorcet - Pairwise resolution over ranked ballots
use super::quartile::MEDIAN_CANDIDATE;

/// Ranked ballot: candidate indices, most preferred first
pub type Ballot = Vec<usize>;

/// Rank position of every candidate on one ballot (`None` = unranked)
/// Out-of-range indices are ignored, a repeated index keeps its first position.
fn positions(ballot: &[usize], candidates: usize) -> Vec<Option<usize>> {
    let mut pos = vec![None; candidates];
    for (rank, &candidate) in ballot.iter().enumerate() {
        if candidate < candidates && pos[candidate].is_none() {
            pos[candidate] = Some(rank);
        }
    }
    pos
}

/// `m[a][b]` = ballots ranking `a` above `b`
/// A ranked candidate beats any unranked one; two unranked candidates are tied.
pub fn pairwise_matrix(ballots: &[Ballot], candidates: usize) -> Vec<Vec<u32>> {
    let mut matrix = vec![vec![0u32; candidates]; candidates];
    for ballot in ballots {
        let pos = positions(ballot, candidates);
        for a in 0..candidates {
            for b in 0..candidates {
                if a == b {
                    continue;
                }
                let prefers = match (pos[a], pos[b]) {
                    (Some(pa), Some(pb)) => pa < pb,
                    (Some(_), None) => true,
                    _ => false,
                };
                if prefers {
                    matrix[a][b] += 1;
                }
            }
        }
    }
    matrix
}

/// A full ranking: every candidate exactly once
pub fn is_complete_ballot(ballot: &[usize], candidates: usize) -> bool {
    ballot.len() == candidates && positions(ballot, candidates).iter().all(Option::is_some)
}

/// Candidate beating every other one head to head, if any
/// Incomplete ballots are ignored.
pub fn condorcet_winner(ballots: &[Ballot], candidates: usize) -> Option<usize> {
    let valid: Vec<Ballot> = ballots
        .iter()
        .filter(|b| is_complete_ballot(b, candidates))
        .cloned()
        .collect();
    let matrix = pairwise_matrix(&valid, candidates);

    (0..candidates).find(|&a| (0..candidates).all(|b| a == b || matrix[a][b] > matrix[b][a]))
}

/// Winner among the three boundary candidates, median candidate when there is no Condorcet winner
pub fn resolve_boundary_ballots(ballots: &[Ballot]) -> usize {
    condorcet_winner(ballots, 3).unwrap_or(MEDIAN_CANDIDATE)
}
