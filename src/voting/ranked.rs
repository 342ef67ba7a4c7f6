// Ranked - Copeland selection with Borda tie-break
// Used by teams to choose their governance rule at each iteration start

use super::condorcet::{pairwise_matrix, Ballot};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Pairwise wins minus pairwise losses per candidate
pub fn copeland_scores(ballots: &[Ballot], candidates: usize) -> Vec<i64> {
    let matrix = pairwise_matrix(ballots, candidates);
    (0..candidates)
        .map(|a| {
            (0..candidates)
                .filter(|&b| a != b)
                .map(|b| match matrix[a][b].cmp(&matrix[b][a]) {
                    std::cmp::Ordering::Greater => 1,
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                })
                .sum()
        })
        .collect()
}

/// Borda points: first place on a ballot earns `candidates - 1`, unranked earns 0
pub fn borda_scores(ballots: &[Ballot], candidates: usize) -> Vec<i64> {
    let mut scores = vec![0i64; candidates];
    for ballot in ballots {
        let mut seen = vec![false; candidates];
        for (rank, &candidate) in ballot.iter().enumerate() {
            if candidate >= candidates || seen[candidate] {
                continue;
            }
            seen[candidate] = true;
            scores[candidate] += (candidates - 1).saturating_sub(rank) as i64;
        }
    }
    scores
}

fn arg_max(indices: &[usize], scores: &[i64]) -> Vec<usize> {
    let best = indices.iter().map(|&i| scores[i]).max();
    match best {
        Some(best) => indices.iter().copied().filter(|&i| scores[i] == best).collect(),
        None => Vec::new(),
    }
}

/// Copeland winner; Borda among tied winners; the RNG breaks what is left
pub fn select_ranked(ballots: &[Ballot], candidates: usize, rng: &mut StdRng) -> Option<usize> {
    if candidates == 0 {
        return None;
    }
    let all: Vec<usize> = (0..candidates).collect();

    let copeland = copeland_scores(ballots, candidates);
    let leaders = arg_max(&all, &copeland);
    if leaders.len() == 1 {
        return leaders.first().copied();
    }

    let borda = borda_scores(ballots, candidates);
    let finalists = arg_max(&leaders, &borda);
    finalists.choose(rng).copied()
}
