// Voting - Tallies and ranked-choice resolution
// Principle: Pure functions over ballots; randomness only through the injected RNG

pub mod tally;
pub mod quartile;
pub mod condorcet;
pub mod ranked;

pub use condorcet::{resolve_boundary_ballots, Ballot};
pub use quartile::{generate_candidates, MEDIAN_CANDIDATE};
pub use ranked::select_ranked;
pub use tally::{headcount_majority, top_reaching, weighted_choice, weighted_sample, weighted_tally};
