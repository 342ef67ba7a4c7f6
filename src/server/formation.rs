// Formation - Grouping agents into teams
// Principle: Nobody is left on a team of one

use crate::types::{AgentId, TeamId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Smallest team the formation leaves behind
pub const MIN_TEAM_SIZE: usize = 2;

/// Shuffle and chunk into groups of `team_size`; a short tail joins the last group
pub fn form_groups(agents: &[AgentId], team_size: usize, rng: &mut StdRng) -> Vec<Vec<AgentId>> {
    let size = team_size.max(MIN_TEAM_SIZE);
    let mut shuffled = agents.to_vec();
    shuffled.shuffle(rng);

    let mut groups: Vec<Vec<AgentId>> = shuffled.chunks(size).map(|c| c.to_vec()).collect();
    if groups.len() > 1 && groups.last().map_or(false, |g| g.len() < MIN_TEAM_SIZE) {
        if let Some(tail) = groups.pop() {
            if let Some(last) = groups.last_mut() {
                last.extend(tail);
            }
        }
    }
    groups
}

/// Team a revived agent joins: its last team if it still exists, else the smallest
pub fn placement<I>(last_team: Option<TeamId>, teams: I) -> Option<TeamId>
where
    I: IntoIterator<Item = (TeamId, usize)>,
{
    let teams: Vec<(TeamId, usize)> = teams.into_iter().collect();
    if let Some(last) = last_team {
        if teams.iter().any(|(id, _)| *id == last) {
            return Some(last);
        }
    }
    teams
        .iter()
        .min_by_key(|(id, size)| (*size, *id))
        .map(|(id, _)| *id)
}
