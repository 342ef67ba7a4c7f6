// Turn Protocol - One team, one turn, phases in fixed order
// Principle: No phase starts before the previous one has committed its score and pool changes
//
// roll -> contribute (simultaneous) -> announce -> post-contribution hook
//      -> contribution audit -> rank and allowance votes
//      -> withdraw (sequential, clamped) -> announce -> withdrawal audit
//      -> end of turn -> expulsions
//
// Contributions are summed and credited only once every member has decided, so
// no member sees a partially updated pool. Withdrawals are the opposite: each
// one is visible to the next agent in line.

use super::dice::roll_for_income;
use crate::agents::messaging::TeamView;
use crate::agents::Roster;
use crate::governance::leader::hold_election;
use crate::governance::{ApprovalBallots, GovernanceContext, GovernanceError, SeverityBallots};
use crate::types::{AgentId, Score, Team, Vote};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which declared amount an audit checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Contribution,
    Withdrawal,
}

/// One audit that actually ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub phase: AuditPhase,
    pub target: AgentId,
    pub cheated: bool,
    /// Charged to the pool
    pub cost: Score,
    /// Taken from the target and credited to the pool
    pub deduction: Score,
}

/// What happened during a team's turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    pub contributed: Score,
    pub withdrawn: Score,
    pub audits: Vec<AuditEvent>,
    pub promoted: Vec<AgentId>,
    pub accepted_proposals: Vec<AgentId>,
    pub expelled: Vec<AgentId>,
}

/// Runs a single turn for a single team
pub struct TurnProtocol<'a> {
    team: &'a mut Team,
    roster: &'a mut Roster,
    rng: &'a mut StdRng,
    roll_dice: bool,
    /// Living members taking part in this turn
    members: Vec<AgentId>,
    summary: TurnSummary,
}

fn team_view<'m>(team: &Team, members: &'m [AgentId]) -> TeamView<'m> {
    TeamView {
        team: team.id,
        members,
        common_pool: team.common_pool,
        kind: team.kind(),
    }
}

impl<'a> TurnProtocol<'a> {
    pub fn new(team: &'a mut Team, roster: &'a mut Roster, rng: &'a mut StdRng) -> Self {
        Self {
            team,
            roster,
            rng,
            roll_dice: true,
            members: Vec::new(),
            summary: TurnSummary::default(),
        }
    }

    /// Disable the income roll (scenarios with fixed scores)
    pub fn with_dice(mut self, roll_dice: bool) -> Self {
        self.roll_dice = roll_dice;
        self
    }

    pub fn run(mut self) -> Result<TurnSummary, GovernanceError> {
        self.members = self
            .team
            .members
            .iter()
            .filter(|id| {
                self.roster
                    .get(id)
                    .map_or(false, |a| a.alive && a.team == Some(self.team.id))
            })
            .copied()
            .collect();

        if self.members.is_empty() {
            debug!("{} has no living members, skipping turn", self.team.id);
            return Ok(self.summary);
        }

        self.ensure_leader();
        self.roll();
        self.contribute();
        self.announce_contributions();
        self.post_contribution()?;
        self.audit(AuditPhase::Contribution);
        self.sub_votes();
        self.withdraw();
        self.announce_withdrawals();
        self.audit(AuditPhase::Withdrawal);
        self.team.governance.end_of_turn(self.rng);
        self.expel();

        debug!(
            "{} turn done: +{} -{} pool={}",
            self.team.id, self.summary.contributed, self.summary.withdrawn, self.team.common_pool
        );
        Ok(self.summary)
    }

    /// Leader-weighted teams elect a new leader once the old one is gone
    fn ensure_leader(&mut self) {
        let vacant = self
            .team
            .governance
            .as_leadership()
            .map_or(false, |l| l.leader().is_none());
        if !vacant {
            return;
        }

        let mut ctx = GovernanceContext {
            team_id: self.team.id,
            members: &self.members,
            common_pool: self.team.common_pool,
            roster: self.roster,
            rng: self.rng,
        };
        if let Some(leadership) = self.team.governance.as_leadership() {
            hold_election(leadership, &mut ctx);
        }
    }

    fn roll(&mut self) {
        for id in &self.members {
            let Some(agent) = self.roster.get_mut(id) else {
                continue;
            };
            agent.actions = Default::default();
            if self.roll_dice {
                let income = roll_for_income(agent.source_mut(), self.rng);
                agent.score = agent.score.saturating_add(income);
            }
        }
    }

    /// Every member decides against the same pool; the sum is credited afterwards
    fn contribute(&mut self) {
        let view = team_view(self.team, &self.members);
        let mut total: Score = 0;

        for &id in &self.members {
            let score = self.roster.score_of(&id);
            let expected = self.team.governance.expected_contribution(id, score);

            let reply = self.roster.ask(id, view, |source, ctx| {
                let actual = source
                    .actual_contribution(ctx, expected)
                    .clamp(0, ctx.score.max(0));
                (actual, source.stated_contribution(ctx, actual, expected))
            });
            let Some((actual, stated)) = reply else {
                continue;
            };

            self.team
                .governance
                .record_contribution_audit(id, score, actual, stated);
            if let Some(agent) = self.roster.get_mut(&id) {
                agent.deduct(actual);
                agent.actions.actual_contribution = actual;
                agent.actions.stated_contribution = stated;
            }
            total = total.saturating_add(actual);
        }

        self.team.credit(total);
        self.summary.contributed = total;
        debug!("{} contributed {} (pool {})", self.team.id, total, self.team.common_pool);
    }

    fn announce_contributions(&mut self) {
        let mut order = self.members.clone();
        order.shuffle(&mut *self.rng);
        for sender in order {
            let stated = self
                .roster
                .get(&sender)
                .map_or(0, |a| a.actions.stated_contribution);
            self.roster
                .broadcast(&self.members, sender, |source| source.contribution_statement(sender, stated));
        }
    }

    fn post_contribution(&mut self) -> Result<(), GovernanceError> {
        let mut ctx = GovernanceContext {
            team_id: self.team.id,
            members: &self.members,
            common_pool: self.team.common_pool,
            roster: self.roster,
            rng: self.rng,
        };
        self.team.governance.run_post_contribution(&mut ctx)
    }

    /// Vote, maybe audit, tell everyone, punish a cheater
    fn audit(&mut self, phase: AuditPhase) {
        let view = team_view(self.team, &self.members);
        let votes: Vec<Vote> = self
            .roster
            .gather(&self.members, view, |source, ctx| match phase {
                AuditPhase::Contribution => source.contribution_audit_vote(ctx),
                AuditPhase::Withdrawal => source.withdrawal_audit_vote(ctx),
            })
            .into_values()
            .collect();

        let Some(target) = self.team.governance.resolve_vote(&votes) else {
            return;
        };
        if !self.members.contains(&target) {
            debug!("{} voted to audit outsider {}, ignored", self.team.id, target);
            return;
        }

        let cost = self.team.governance.audit_cost(self.team.common_pool);
        let cost = self.team.withdraw(cost);
        let cheated = match phase {
            AuditPhase::Contribution => self.team.governance.contribution_audit_outcome(target),
            AuditPhase::Withdrawal => self.team.governance.withdrawal_audit_outcome(target),
        };

        self.roster.broadcast(&self.members, AgentId::NIL, |source| match phase {
            AuditPhase::Contribution => source.contribution_audit_result(target, cheated),
            AuditPhase::Withdrawal => source.withdrawal_audit_result(target, cheated),
        });

        let deduction = if cheated { self.punish(target) } else { 0 };
        info!(
            "🔎 {} audited {} ({:?}): {} (cost {}, deducted {})",
            self.team.id,
            target,
            phase,
            if cheated { "cheated" } else { "clean" },
            cost,
            deduction
        );

        self.summary.audits.push(AuditEvent {
            phase,
            target,
            cheated,
            cost,
            deduction,
        });
    }

    /// Deduct from a caught cheater into the pool, then apply role consequences
    fn punish(&mut self, target: AgentId) -> Score {
        let score = self.roster.score_of(&target);

        let deduction = if self.team.governance.as_confession().is_some() {
            let view = team_view(self.team, &self.members);
            let ballots: SeverityBallots = self
                .roster
                .gather(&self.members, view, |source, ctx| source.punishment_vote(ctx));
            let confessed = self
                .roster
                .ask(target, view, |source, ctx| source.confession(ctx))
                .unwrap_or(true);
            self.roster
                .broadcast(&self.members, target, |source| source.confession_statement(target, confessed));

            match self.team.governance.as_confession() {
                Some(confession) => {
                    confession.apply_punishment_votes(&ballots);
                    confession.confession_deduction(target, score, confessed)
                }
                None => 0,
            }
        } else {
            self.team.governance.punishment(score, target)
        };

        let taken = self
            .roster
            .get_mut(&target)
            .map_or(0, |agent| agent.deduct(deduction));
        self.team.credit(taken);

        let deposed = self
            .team
            .governance
            .as_leadership()
            .map_or(false, |l| l.leader() == Some(target));
        if deposed {
            info!("👑 Leader {} of {} caught cheating", target, self.team.id);
            let mut ctx = GovernanceContext {
                team_id: self.team.id,
                members: &self.members,
                common_pool: self.team.common_pool,
                roster: self.roster,
                rng: self.rng,
            };
            if let Some(leadership) = self.team.governance.as_leadership() {
                hold_election(leadership, &mut ctx);
            }
        }
        taken
    }

    /// Rank-up and allowance votes, for rules that hold them
    fn sub_votes(&mut self) {
        let view = team_view(self.team, &self.members);

        if self.team.governance.as_rank_voting().is_some() {
            let ballots: ApprovalBallots = self
                .roster
                .gather(&self.members, view, |source, ctx| source.rank_up_vote(ctx));
            if let Some(voting) = self.team.governance.as_rank_voting() {
                self.summary.promoted = voting.apply_rank_up_votes(&ballots);
            }
        }

        if self.team.governance.as_withdrawal_proposals().is_some() {
            let allowances: BTreeMap<AgentId, Score> = self
                .members
                .iter()
                .map(|id| {
                    let score = self.roster.score_of(id);
                    let allowance = self
                        .team
                        .governance
                        .expected_withdrawal(*id, score, self.team.common_pool);
                    (*id, allowance)
                })
                .collect();

            let proposals: BTreeMap<AgentId, Score> =
                self.roster.gather(&self.members, view, |source, ctx| {
                    let current = allowances.get(&ctx.agent).copied().unwrap_or(0);
                    source.proposed_withdrawal(ctx, current)
                });
            for (proposer, proposed) in &proposals {
                let (proposer, proposed) = (*proposer, *proposed);
                self.roster.broadcast(&self.members, proposer, |source| {
                    source.proposed_withdrawal_statement(proposer, proposed)
                });
            }

            let ballots: ApprovalBallots = self.roster.gather(&self.members, view, |source, ctx| {
                source.proposed_withdrawal_vote(ctx, &proposals)
            });
            if let Some(voting) = self.team.governance.as_withdrawal_proposals() {
                self.summary.accepted_proposals = voting.apply_withdrawal_proposals(&proposals, &ballots);
            }
        }
    }

    /// Sequential and clamped: each agent sees the pool the previous one left
    fn withdraw(&mut self) {
        let order = self.team.governance.withdrawal_order(&self.members, self.rng);

        for id in order {
            let pool_before = self.team.common_pool;
            let score = self.roster.score_of(&id);
            let expected = self
                .team
                .governance
                .expected_withdrawal(id, score, pool_before);

            let view = team_view(self.team, &self.members);
            let team = &mut *self.team;
            let reply = self.roster.ask(id, view, |source, ctx| {
                let requested = source.actual_withdrawal(ctx, expected);
                let taken = team.withdraw(requested);
                (taken, source.stated_withdrawal(ctx, taken, expected))
            });
            let Some((taken, stated)) = reply else {
                continue;
            };

            if let Some(agent) = self.roster.get_mut(&id) {
                agent.score = agent.score.saturating_add(taken);
                agent.actions.actual_withdrawal = taken;
                agent.actions.stated_withdrawal = stated;
            }
            self.team
                .governance
                .record_withdrawal_audit(id, score, taken, stated, pool_before);
            self.summary.withdrawn = self.summary.withdrawn.saturating_add(taken);
        }
        debug!(
            "{} withdrew {} (pool {})",
            self.team.id, self.summary.withdrawn, self.team.common_pool
        );
    }

    /// Shuffled independently of the withdrawal order
    fn announce_withdrawals(&mut self) {
        let mut order = self.members.clone();
        order.shuffle(&mut *self.rng);
        for sender in order {
            let stated = self
                .roster
                .get(&sender)
                .map_or(0, |a| a.actions.stated_withdrawal);
            self.roster
                .broadcast(&self.members, sender, |source| source.withdrawal_statement(sender, stated));
        }
    }

    fn expel(&mut self) {
        for id in self.team.governance.members_to_expel() {
            if !self.team.contains(&id) {
                continue;
            }
            let score = self.roster.score_of(&id);
            let penalty = self.team.governance.expulsion_penalty(score, id);
            if let Some(agent) = self.roster.get_mut(&id) {
                let taken = agent.deduct(penalty);
                self.team.credit(taken);
                agent.leave();
            }
            self.team.remove_member(&id);
            self.members.retain(|m| *m != id);
            info!("🚪 {} expelled from {}", id, self.team.id);
            self.summary.expelled.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{create_rule, FixedRule, GovernanceKind, GovernanceParams};
    use crate::tests::support::{ids, rng, roster_with, Script};
    use crate::types::TeamId;

    fn fixed_team(members: &[AgentId], roster: &mut Roster) -> Team {
        let team = Team::new(TeamId(1), members.to_vec(), Box::new(FixedRule::default()));
        for id in members {
            if let Some(agent) = roster.get_mut(id) {
                agent.join(team.id);
            }
        }
        team
    }

    #[test]
    fn test_no_living_members_is_a_no_op() {
        let members = ids(2);
        let (mut roster, _log) = roster_with(
            members.iter().map(|id| (*id, 10, Script::default())).collect(),
        );
        let mut team = fixed_team(&members, &mut roster);
        for id in &members {
            roster.get_mut(id).unwrap().kill();
        }
        let mut r = rng(0);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();
        assert_eq!(summary, TurnSummary::default());
    }

    #[test]
    fn test_teamless_agent_is_skipped() {
        let members = ids(3);
        let (mut roster, _log) = roster_with(
            members.iter().map(|id| (*id, 10, Script::default())).collect(),
        );
        let mut team = fixed_team(&members, &mut roster);
        roster.get_mut(&members[2]).unwrap().leave();

        let mut r = rng(0);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();
        assert_eq!(summary.contributed, 20);
        assert_eq!(roster.score_of(&members[2]), 10);
    }

    #[test]
    fn test_caught_liar_is_punished_into_pool() {
        let members = ids(3);
        let liar = Script {
            contribute: Some(4),
            state_contribution: Some(10),
            ..Script::default()
        };
        let accuser = Script {
            contribution_audit_target: Some(members[0]),
            ..Script::default()
        };
        let (mut roster, log) = roster_with(vec![
            (members[0], 10, liar),
            (members[1], 10, accuser.clone()),
            (members[2], 10, accuser),
        ]);
        let mut team = fixed_team(&members, &mut roster);
        let mut r = rng(0);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        let audit = &summary.audits[0];
        assert_eq!(audit.phase, AuditPhase::Contribution);
        assert_eq!(audit.target, members[0]);
        assert!(audit.cheated);
        // liar kept 6, loses 25% of it
        assert_eq!(audit.deduction, 1);
        assert_eq!(log.lock().unwrap().contribution_results.len(), 3);
    }

    #[test]
    fn test_adventurer_rank_up_during_turn() {
        let members = ids(2);
        let voter = Script {
            rank_up: vec![members[1]],
            ..Script::default()
        };
        let (mut roster, _log) = roster_with(vec![
            (members[0], 10, voter),
            (members[1], 10, Script::default()),
        ]);
        let rule = create_rule(GovernanceKind::Adventurer, &GovernanceParams::default(), 5);
        let mut team = Team::new(TeamId(2), members.clone(), rule);
        for id in &members {
            roster.get_mut(id).unwrap().join(team.id);
        }

        let mut r = rng(0);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();
        assert_eq!(summary.promoted, vec![members[1]]);
    }
}
