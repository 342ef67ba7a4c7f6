// Integration Tests - Whole turns and whole runs
// Scripted agents drive the turn protocol; built-in strategies drive full runs.

#[cfg(test)]
mod turn_tests {
    use crate::agents::Roster;
    use crate::governance::{create_rule, FixedRule, GovernanceKind, GovernanceParams, LeaderRule};
    use crate::server::{AuditPhase, TurnProtocol};
    use crate::tests::support::{ids, rng, roster_with, Script};
    use crate::types::{AgentId, Score, Team, TeamId};

    // ===== HELPER FUNCTIONS =====

    fn team_of(kind: GovernanceKind, members: &[AgentId], roster: &mut Roster) -> Team {
        let rule = create_rule(kind, &GovernanceParams::default(), 5);
        let team = Team::new(TeamId(1), members.to_vec(), rule);
        for id in members {
            if let Some(agent) = roster.get_mut(id) {
                agent.join(team.id);
            }
        }
        team
    }

    fn honest_roster(members: &[AgentId], score: Score) -> (Roster, crate::tests::support::SharedLog) {
        roster_with(members.iter().map(|id| (*id, score, Script::default())).collect())
    }

    // ===== TEST 1: BASELINE TURN =====

    #[test]
    fn test_fixed_turn_moves_scores_through_pool() {
        let members = ids(4);
        let (mut roster, _log) = honest_roster(&members, 10);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(1);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        assert_eq!(summary.contributed, 40);
        assert_eq!(summary.withdrawn, 8);
        assert_eq!(team.common_pool, 32);
        for id in &members {
            assert_eq!(roster.score_of(id), 2);
        }
        assert!(summary.audits.is_empty());
    }

    // ===== TEST 2: WITHDRAWALS NEVER OVERDRAW =====

    #[test]
    fn test_withdrawals_clamp_to_pool() {
        let members = ids(4);
        let (mut roster, _log) = honest_roster(&members, 1);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(2);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        assert_eq!(summary.contributed, 4);
        assert_eq!(summary.withdrawn, 4);
        assert_eq!(team.common_pool, 0);
        let total: Score = members.iter().map(|id| roster.score_of(id)).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_expected_above_pool_takes_pool() {
        let members = ids(1);
        let (mut roster, _log) = honest_roster(&members, 5);
        let params = GovernanceParams {
            fixed: crate::governance::FixedParams {
                expected_withdrawal: 10,
                ..Default::default()
            },
            ..GovernanceParams::default()
        };
        let mut team = Team::new(TeamId(1), members.clone(), create_rule(GovernanceKind::Fixed, &params, 5));
        roster.get_mut(&members[0]).unwrap().join(team.id);

        let mut r = rng(12);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        assert_eq!(summary.contributed, 5);
        assert_eq!(summary.withdrawn, 5);
        assert_eq!(team.common_pool, 0);
        assert_eq!(roster.score_of(&members[0]), 5);
    }

    #[test]
    fn test_greedy_request_is_clamped() {
        let members = ids(2);
        let greedy = Script {
            withdraw: Some(1_000),
            ..Script::default()
        };
        let (mut roster, _log) = roster_with(vec![
            (members[0], 10, greedy),
            (members[1], 10, Script::default()),
        ]);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(3);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        assert!(team.common_pool >= 0);
        assert_eq!(summary.withdrawn, 20 - team.common_pool);
    }

    // ===== TEST 3: PHASE ORDER =====

    #[test]
    fn test_contributions_land_before_withdrawals() {
        let members = ids(3);
        let (mut roster, log) = honest_roster(&members, 10);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(4);
        TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        let log = log.lock().unwrap();
        // everyone decided its contribution against the same, empty pool
        assert!(log.pools_at_contribution.iter().all(|(_, pool)| *pool == 0));
        // the first withdrawer already saw every contribution
        assert_eq!(log.pools_at_withdrawal[0].1, 30);
        let pools: Vec<Score> = log.pools_at_withdrawal.iter().map(|(_, p)| *p).collect();
        assert!(pools.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_statements_reach_everyone_but_the_sender() {
        let members = ids(3);
        let (mut roster, log) = honest_roster(&members, 10);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(5);
        TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.contribution_statements.len(), 6);
        assert_eq!(log.withdrawal_statements.len(), 6);
        assert!(log.contribution_statements.iter().all(|(to, from, _)| to != from));
    }

    // ===== TEST 4: AUDITS =====

    #[test]
    fn test_withdrawal_audit_broadcast_to_whole_team() {
        let members = ids(3);
        let thief = Script {
            withdraw: Some(6),
            state_withdrawal: Some(2),
            ..Script::default()
        };
        let accuser = Script {
            withdrawal_audit_target: Some(members[0]),
            ..Script::default()
        };
        let (mut roster, log) = roster_with(vec![
            (members[0], 10, thief),
            (members[1], 10, accuser.clone()),
            (members[2], 10, accuser),
        ]);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(6);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        let audit = summary
            .audits
            .iter()
            .find(|a| a.phase == AuditPhase::Withdrawal)
            .unwrap();
        assert_eq!(audit.target, members[0]);
        assert!(audit.cheated);

        let log = log.lock().unwrap();
        assert_eq!(log.withdrawal_results.len(), 3);
        assert!(log.withdrawal_results.iter().all(|(_, agent, cheated)| *agent == members[0] && *cheated));
    }

    #[test]
    fn test_minority_accusation_has_no_effect() {
        let members = ids(4);
        let accuser = Script {
            contribution_audit_target: Some(members[0]),
            ..Script::default()
        };
        let (mut roster, log) = roster_with(vec![
            (members[0], 10, Script::default()),
            (members[1], 10, accuser),
            (members[2], 10, Script::default()),
            (members[3], 10, Script::default()),
        ]);
        let mut team = team_of(GovernanceKind::Fixed, &members, &mut roster);

        let mut r = rng(7);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();
        assert!(summary.audits.is_empty());
        assert!(log.lock().unwrap().contribution_results.is_empty());
    }

    // ===== TEST 5: LEADERSHIP =====

    #[test]
    fn test_leader_elected_then_reelected_when_caught() {
        let members = ids(3);
        let voter = |target: AgentId| Script {
            leader_choice: Some(members[1]),
            contribution_audit_target: Some(target),
            ..Script::default()
        };
        let leader = Script {
            contribute: Some(4),
            state_contribution: Some(10),
            ..voter(members[1])
        };
        let (mut roster, log) = roster_with(vec![
            (members[0], 10, voter(members[1])),
            (members[1], 10, leader),
            (members[2], 10, voter(members[1])),
        ]);
        let mut team = team_of(GovernanceKind::Leader, &members, &mut roster);

        let mut r = rng(8);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        assert!(summary.audits[0].cheated);
        let log = log.lock().unwrap();
        // once at turn start, once after the audit
        assert_eq!(log.leaders.len(), 6);
        assert!(log.leaders.iter().all(|l| *l == Some(members[1])));
    }

    #[test]
    fn test_repeat_offender_is_expelled() {
        let members = ids(3);
        let accuser = Script {
            leader_choice: Some(members[0]),
            contribution_audit_target: Some(members[1]),
            ..Script::default()
        };
        let liar = Script {
            leader_choice: Some(members[0]),
            contribute: Some(4),
            state_contribution: Some(10),
            ..Script::default()
        };
        let (mut roster, _log) = roster_with(vec![
            (members[0], 100, accuser.clone()),
            (members[1], 100, liar),
            (members[2], 100, accuser),
        ]);
        let mut team = team_of(GovernanceKind::Leader, &members, &mut roster);

        let mut r = rng(9);
        let mut expelled = Vec::new();
        for _ in 0..3 {
            let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
                .with_dice(false)
                .run()
                .unwrap();
            assert!(summary.audits.iter().any(|a| a.target == members[1] && a.cheated));
            expelled.extend(summary.expelled);
        }

        assert_eq!(expelled, vec![members[1]]);
        assert!(!team.contains(&members[1]));
        let agent = roster.get(&members[1]).unwrap();
        assert!(agent.alive);
        assert_eq!(agent.team, None);
        assert_eq!(agent.last_team, Some(team.id));
    }

    #[test]
    fn test_expelled_agent_sits_out_next_turn() {
        let members = ids(2);
        let (mut roster, _log) = honest_roster(&members, 10);
        let mut team = Team::new(TeamId(1), members.clone(), Box::new(FixedRule::default()));
        roster.get_mut(&members[0]).unwrap().join(team.id);
        roster.get_mut(&members[1]).unwrap().join(team.id);
        team.remove_member(&members[1]);
        roster.get_mut(&members[1]).unwrap().leave();

        let mut r = rng(10);
        let summary = TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();
        assert_eq!(summary.contributed, 10);
        assert_eq!(roster.score_of(&members[1]), 10);
    }

    #[test]
    fn test_leader_takes_larger_share() {
        let members = ids(3);
        let script = Script {
            leader_choice: Some(members[0]),
            ..Script::default()
        };
        let (mut roster, _log) =
            roster_with(members.iter().map(|id| (*id, 20, script.clone())).collect());
        let mut team = Team::new(
            TeamId(1),
            members.clone(),
            Box::new(LeaderRule::new(Default::default(), 5)),
        );
        for id in &members {
            roster.get_mut(id).unwrap().join(team.id);
        }

        let mut r = rng(11);
        TurnProtocol::new(&mut team, &mut roster, &mut r)
            .with_dice(false)
            .run()
            .unwrap();

        // leader withdraws first, from the full pool
        assert!(roster.score_of(&members[0]) > roster.score_of(&members[1]));
        assert!(roster.score_of(&members[0]) > roster.score_of(&members[2]));
    }
}

#[cfg(test)]
mod run_tests {
    use crate::cli::config::SimulationConfig;
    use crate::cli::runner::build_roster;
    use crate::governance::GovernanceKind;
    use crate::server::{Environment, MemoryRecorder};
    use crate::tests::support::rng;
    use std::sync::atomic::AtomicBool;

    fn run(kind: GovernanceKind, seed: u64) -> (Environment, MemoryRecorder) {
        let config = SimulationConfig {
            iterations: 2,
            turns_per_iteration: 6,
            honest_agents: 9,
            cheater_agents: 3,
            rule_menu: vec![kind],
            ..SimulationConfig::default()
        };
        let mut master = rng(seed);
        let roster = build_roster(&config, &mut master);
        let mut env = Environment::new(config.settings(), roster, master).unwrap();
        let mut recorder = MemoryRecorder::new();
        env.run(&mut recorder, &AtomicBool::new(false)).unwrap();
        (env, recorder)
    }

    #[test]
    fn test_every_rule_survives_a_full_run() {
        for kind in GovernanceKind::ALL {
            let (env, recorder) = run(kind, 21);
            assert_eq!(recorder.len(), 12, "{}", kind);

            for team in env.teams() {
                assert_eq!(team.kind(), kind);
                assert!(team.common_pool >= 0, "{} pool went negative", kind);
                for id in &team.members {
                    let agent = env.roster().get(id).unwrap();
                    assert!(agent.alive);
                    assert_eq!(agent.team, Some(team.id));
                }
            }
            for id in env.dead() {
                let agent = env.roster().get(id).unwrap();
                assert!(!agent.alive);
                assert_eq!(agent.team, None);
            }
        }
    }

    #[test]
    fn test_teamless_agents_record_zero_actions() {
        for kind in GovernanceKind::ALL {
            for seed in 30..34 {
                let (_env, recorder) = run(kind, seed);
                for pair in recorder.records().windows(2) {
                    // Agents that were already teamless when the turn began
                    let idle = pair[1].agents.iter().filter(|row| {
                        row.team.is_none()
                            && pair[0]
                                .agents
                                .iter()
                                .any(|before| before.agent == row.agent && before.team.is_none())
                    });
                    for row in idle {
                        assert_eq!(
                            (
                                row.actual_contribution,
                                row.stated_contribution,
                                row.actual_withdrawal,
                                row.stated_withdrawal,
                            ),
                            (0, 0, 0, 0),
                            "{} seed {}: {} in turn {}.{}",
                            kind,
                            seed,
                            row.agent,
                            pair[1].iteration,
                            pair[1].turn
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_records_follow_turn_order() {
        let (_env, recorder) = run(GovernanceKind::Adventurer, 22);
        let order: Vec<(u32, u32)> = recorder
            .records()
            .iter()
            .map(|r| (r.iteration, r.turn))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.first(), Some(&(1, 1)));
        assert_eq!(order.last(), Some(&(2, 6)));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let (_, first) = run(GovernanceKind::Monitoring, 23);
        let (_, second) = run(GovernanceKind::Monitoring, 23);
        assert_eq!(first.records(), second.records());
    }
}
