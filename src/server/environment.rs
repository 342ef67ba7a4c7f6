// Environment - Iterations, teams, deaths and revivals
// Principle: One master RNG drives everything, so a seed replays a whole run
//
// Lifecycle:
// 1. Teams are formed once from the initial population
// 2. Each iteration revives the dead, places expelled agents on another team,
//    lets every team pick its rule and resets the pools
// 3. Each turn runs the turn protocol for every team, then (every
//    `threshold_period` turns) kills agents below the survival threshold

use super::formation::{form_groups, placement};
use super::recorder::Recorder;
use super::turn::{TurnProtocol, TurnSummary};
use super::SimulationError;
use crate::agents::messaging::TeamView;
use crate::agents::{Roster, TurnActions};
use crate::governance::{create_rule, GovernanceContext, GovernanceKind, GovernanceParams};
use crate::types::{
    AgentId, AgentRecord, CommonRecord, IterationNumber, Score, Team, TeamId, TeamRecord,
    TurnNumber, TurnRecord,
};
use crate::voting::{select_ranked, Ballot};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Knobs of a run
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSettings {
    pub iterations: IterationNumber,
    pub turns_per_iteration: TurnNumber,
    /// The threshold is applied every this many turns
    pub threshold_period: TurnNumber,
    /// New thresholds are drawn from `threshold_min..threshold_max`
    pub threshold_min: Score,
    pub threshold_max: Score,
    /// Score given back to a revived agent
    pub initial_score: Score,
    pub team_size: usize,
    pub audit_window: usize,
    /// Rules teams choose from
    pub rule_menu: Vec<GovernanceKind>,
    pub params: GovernanceParams,
    pub roll_dice: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            iterations: 3,
            turns_per_iteration: 20,
            threshold_period: 3,
            threshold_min: 10,
            threshold_max: 20,
            initial_score: 0,
            team_size: 4,
            audit_window: 5,
            rule_menu: GovernanceKind::ALL.to_vec(),
            params: GovernanceParams::default(),
            roll_dice: true,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub turns_run: u64,
    pub interrupted: bool,
    pub survivors: usize,
}

/// The simulation world
pub struct Environment {
    settings: EnvironmentSettings,
    roster: Roster,
    teams: BTreeMap<TeamId, Team>,
    dead: BTreeSet<AgentId>,
    threshold: Score,
    rng: StdRng,
}

impl Environment {
    pub fn new(
        settings: EnvironmentSettings,
        roster: Roster,
        mut rng: StdRng,
    ) -> Result<Self, SimulationError> {
        if roster.is_empty() {
            return Err(SimulationError::NoAgents);
        }
        if settings.rule_menu.is_empty() {
            return Err(SimulationError::EmptyTeamMenu);
        }

        let threshold = draw_threshold(&settings, &mut rng);
        Ok(Self {
            settings,
            roster,
            teams: BTreeMap::new(),
            dead: BTreeSet::new(),
            threshold,
            rng,
        })
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub fn team(&self, id: &TeamId) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn team_mut(&mut self, id: &TeamId) -> Option<&mut Team> {
        self.teams.get_mut(id)
    }

    pub fn threshold(&self) -> Score {
        self.threshold
    }

    pub fn dead(&self) -> &BTreeSet<AgentId> {
        &self.dead
    }

    /// Group the living population into teams; earlier teams are dissolved
    pub fn form_teams(&mut self) {
        let living = self.roster.living_ids();
        let groups = form_groups(&living, self.settings.team_size, &mut self.rng);
        let default_kind = self.settings.rule_menu[0];

        self.teams.clear();
        for (index, group) in groups.into_iter().enumerate() {
            let id = TeamId(index as u32 + 1);
            for agent in &group {
                if let Some(agent) = self.roster.get_mut(agent) {
                    agent.join(id);
                }
            }
            let rule = create_rule(default_kind, &self.settings.params, self.settings.audit_window);
            self.teams.insert(id, Team::new(id, group, rule));
        }
        info!("👥 Formed {} teams from {} agents", self.teams.len(), living.len());
    }

    /// Revive the dead, place the teamless, reselect rules, reset pools and
    /// run pre-iteration hooks
    pub fn start_iteration(&mut self, iteration: IterationNumber) -> Result<(), SimulationError> {
        info!("🔄 Iteration {} starting", iteration);
        self.revive_dead();
        self.place_teamless();

        let ids: Vec<TeamId> = self.teams.keys().copied().collect();
        for id in ids {
            self.select_rule(id);

            let Some(team) = self.teams.get_mut(&id) else {
                continue;
            };
            team.reset_pool();

            let members: Vec<AgentId> = team
                .members
                .iter()
                .filter(|m| self.roster.get(m).map_or(false, |a| a.alive))
                .copied()
                .collect();
            let mut ctx = GovernanceContext {
                team_id: id,
                members: &members,
                common_pool: team.common_pool,
                roster: &mut self.roster,
                rng: &mut self.rng,
            };
            team.governance.run_pre_iteration(&mut ctx)?;
        }
        Ok(())
    }

    /// Run every team's turn, then maybe apply the threshold
    pub fn run_turn(
        &mut self,
        iteration: IterationNumber,
        turn: TurnNumber,
    ) -> Result<TurnRecord, SimulationError> {
        debug!("Iteration {}, turn {}", iteration, turn);
        for agent in self.roster.iter_mut() {
            agent.actions = TurnActions::default();
        }

        let mut totals = TurnSummary::default();
        for team in self.teams.values_mut() {
            let summary = TurnProtocol::new(team, &mut self.roster, &mut self.rng)
                .with_dice(self.settings.roll_dice)
                .run()?;
            totals.contributed += summary.contributed;
            totals.withdrawn += summary.withdrawn;
            totals.audits.extend(summary.audits);
            totals.expelled.extend(summary.expelled);
        }
        debug!(
            "Turn {}: contributed {}, withdrew {}, {} audits",
            turn,
            totals.contributed,
            totals.withdrawn,
            totals.audits.len()
        );

        let period = self.settings.threshold_period.max(1);
        let applied = turn % period == 0;
        let threshold = self.threshold;
        if applied {
            self.apply_threshold();
        }
        Ok(self.snapshot(iteration, turn, threshold, applied))
    }

    /// Kill every living agent below the threshold, then draw a new one
    pub fn apply_threshold(&mut self) -> Vec<AgentId> {
        let threshold = self.threshold;
        let doomed: Vec<AgentId> = self
            .roster
            .iter()
            .filter(|a| a.alive && a.score < threshold)
            .map(|a| a.id)
            .collect();

        for id in &doomed {
            if let Some(agent) = self.roster.get_mut(id) {
                if let Some(team_id) = agent.team {
                    if let Some(team) = self.teams.get_mut(&team_id) {
                        team.remove_member(id);
                    }
                }
                agent.kill();
            }
            self.dead.insert(*id);
            info!("💀 {} died below threshold {}", id, threshold);
        }

        self.threshold = draw_threshold(&self.settings, &mut self.rng);
        debug!("New survival threshold: {}", self.threshold);
        doomed
    }

    /// Full run; `stop` is checked between turns
    pub fn run(
        &mut self,
        recorder: &mut dyn Recorder,
        stop: &AtomicBool,
    ) -> Result<RunOutcome, SimulationError> {
        if self.teams.is_empty() {
            self.form_teams();
        }

        let mut turns_run = 0;
        for iteration in 1..=self.settings.iterations {
            self.start_iteration(iteration)?;
            for turn in 1..=self.settings.turns_per_iteration {
                if stop.load(Ordering::SeqCst) {
                    warn!("⚠️  Stopped at iteration {}, turn {}", iteration, turn);
                    return Ok(self.outcome(turns_run, true));
                }
                let record = self.run_turn(iteration, turn)?;
                recorder.record(record);
                turns_run += 1;
            }
            info!(
                "✅ Iteration {} done: {} alive, {} dead",
                iteration,
                self.roster.living_ids().len(),
                self.dead.len()
            );
        }
        Ok(self.outcome(turns_run, false))
    }

    fn outcome(&self, turns_run: u64, interrupted: bool) -> RunOutcome {
        RunOutcome {
            turns_run,
            interrupted,
            survivors: self.roster.living_ids().len(),
        }
    }

    fn revive_dead(&mut self) {
        let dead = std::mem::take(&mut self.dead);
        for id in dead {
            let Some(agent) = self.roster.get_mut(&id) else {
                continue;
            };
            agent.revive(self.settings.initial_score);

            let sizes = self.teams.values().map(|t| (t.id, t.len()));
            let Some(team_id) = placement(agent.last_team, sizes) else {
                continue;
            };
            agent.join(team_id);
            if let Some(team) = self.teams.get_mut(&team_id) {
                team.add_member(id);
            }
            debug!("{} revived into {}", id, team_id);
        }
    }

    /// Living agents without a team join the smallest team other than the one
    /// they were expelled from; that team only if it is the last one left
    fn place_teamless(&mut self) {
        let teamless: Vec<AgentId> = self
            .roster
            .iter()
            .filter(|a| a.alive && !a.has_team())
            .map(|a| a.id)
            .collect();

        for id in teamless {
            let Some(agent) = self.roster.get_mut(&id) else {
                continue;
            };
            let expelled_from = agent.last_team;
            let others = self
                .teams
                .values()
                .filter(|t| Some(t.id) != expelled_from)
                .map(|t| (t.id, t.len()));
            let fallback = self.teams.values().map(|t| (t.id, t.len()));
            let Some(team_id) = placement(None, others).or_else(|| placement(expelled_from, fallback)) else {
                continue;
            };
            agent.join(team_id);
            if let Some(team) = self.teams.get_mut(&team_id) {
                team.add_member(id);
            }
            info!("🏠 {} placed on {}", id, team_id);
        }
    }

    /// Copeland over members' rankings of the menu, Borda then RNG on ties.
    /// Reselecting the current kind keeps its state.
    fn select_rule(&mut self, id: TeamId) {
        let menu = self.settings.rule_menu.clone();
        let Some(team) = self.teams.get_mut(&id) else {
            return;
        };
        let current = team.kind();

        let members = team.members.clone();
        let view = TeamView {
            team: id,
            members: &members,
            common_pool: team.common_pool,
            kind: current,
        };
        let rankings = self
            .roster
            .gather(&members, view, |source, ctx| source.governance_ranking(ctx, &menu));

        let ballots: Vec<Ballot> = rankings
            .into_values()
            .map(|ranking| ballot_from_ranking(&ranking, &menu))
            .filter(|ballot| !ballot.is_empty())
            .collect();

        let chosen = if ballots.is_empty() {
            current
        } else {
            select_ranked(&ballots, menu.len(), &mut self.rng)
                .and_then(|index| menu.get(index).copied())
                .unwrap_or(current)
        };

        if chosen != current {
            team.bind_governance(create_rule(
                chosen,
                &self.settings.params,
                self.settings.audit_window,
            ));
        }
        info!("📜 {} governed by {} ({} members)", id, chosen, members.len());
    }

    fn snapshot(
        &self,
        iteration: IterationNumber,
        turn: TurnNumber,
        threshold: Score,
        applied: bool,
    ) -> TurnRecord {
        let agents = self
            .roster
            .iter()
            .map(|a| AgentRecord {
                agent: a.id,
                score: a.score,
                team: a.team,
                alive: a.alive,
                actual_contribution: a.actions.actual_contribution,
                stated_contribution: a.actions.stated_contribution,
                actual_withdrawal: a.actions.actual_withdrawal,
                stated_withdrawal: a.actions.stated_withdrawal,
            })
            .collect();
        let teams = self
            .teams
            .values()
            .map(|t| TeamRecord {
                team: t.id,
                common_pool: t.common_pool,
                rule: t.kind(),
                members: t.len(),
            })
            .collect();

        TurnRecord {
            iteration,
            turn,
            agents,
            teams,
            common: CommonRecord {
                threshold,
                threshold_applied: applied,
            },
        }
    }
}

/// Menu positions in preference order; unknown and repeated kinds are dropped
fn ballot_from_ranking(ranking: &[GovernanceKind], menu: &[GovernanceKind]) -> Ballot {
    let mut ballot = Ballot::new();
    for kind in ranking {
        if let Some(index) = menu.iter().position(|k| k == kind) {
            if !ballot.contains(&index) {
                ballot.push(index);
            }
        }
    }
    ballot
}

fn draw_threshold(settings: &EnvironmentSettings, rng: &mut StdRng) -> Score {
    if settings.threshold_max > settings.threshold_min {
        rng.gen_range(settings.threshold_min..settings.threshold_max)
    } else {
        settings.threshold_min
    }
}
