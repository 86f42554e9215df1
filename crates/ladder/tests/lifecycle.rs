//! End-to-end challenge → match → result → dispute flows against the
//! in-memory store.
//!
//! Run: `cargo test -p ladder --test lifecycle`

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use common::*;
use ladder::challenge::ChallengeStatus;
use ladder::config::MAX_DURATION;
use ladder::consensus::Verdict;
use ladder::notify::LadderEvent;
use ladder::prelude::*;
use ladder::testing::FailingSink;

fn kind<T: std::fmt::Debug>(result: Result<T, LadderError>) -> ErrorKind {
    result.unwrap_err().kind()
}

// ============================================================================
// Challenges
// ============================================================================

mod challenges {
    use super::*;

    #[tokio::test]
    async fn slot_is_exclusive_per_creator() {
        let h = Harness::new();
        let alice = player();
        let first = h.challenge(&alice).await;
        assert_eq!(first.status, ChallengeStatus::Pending);
        assert_eq!(first.expires_at, first.scheduled_at);

        let again = h
            .ladder
            .challenges()
            .create_challenge(
                &alice,
                NewChallenge {
                    game: game(),
                    mode: solo(),
                    scheduled_at: first.scheduled_at,
                    message: Some("rematch?".into()),
                },
            )
            .await;
        assert_eq!(kind(again), ErrorKind::Conflict);

        // Another player may use the same slot.
        h.challenge_at(&player(), solo(), first.scheduled_at).await;
    }

    async fn create_at(
        h: &Harness,
        creator: &Caller,
        scheduled_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Challenge, LadderError> {
        h.ladder
            .challenges()
            .create_challenge(
                creator,
                NewChallenge {
                    game: game(),
                    mode: solo(),
                    scheduled_at,
                    message: None,
                },
            )
            .await
    }

    #[tokio::test]
    async fn rejects_invalid_slots() {
        let h = Harness::new();
        let alice = player();
        let now = h.now();

        let off_grid = create_at(&h, &alice, now + TimeDelta::minutes(20)).await;
        assert_eq!(kind(off_grid), ErrorKind::Validation);
        let past = create_at(&h, &alice, now - TimeDelta::minutes(15)).await;
        assert_eq!(kind(past), ErrorKind::Validation);
        let too_far = create_at(&h, &alice, now + TimeDelta::hours(25)).await;
        assert_eq!(kind(too_far), ErrorKind::Validation);
        assert!(create_at(&h, &alice, now + TimeDelta::minutes(45)).await.is_ok());
    }

    #[test]
    fn builder_rejects_unbounded_durations() {
        let unbounded = LadderConfig {
            scheduling_horizon: Duration::from_secs(u64::MAX / 2),
            ..config()
        };
        let result = Ladder::builder(Arc::new(MemoryStore::new()))
            .config(unbounded)
            .build();
        assert_eq!(kind(result.map(|_| ())), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn longest_windows_do_not_overflow() {
        let h = Harness::with_config(LadderConfig {
            scheduling_horizon: MAX_DURATION,
            abandonment_grace: MAX_DURATION,
            retention: MAX_DURATION,
            ..config()
        });
        let alice = player();
        let far = h
            .challenge_at(&alice, solo(), h.now() + TimeDelta::days(365))
            .await;
        assert_eq!(far.status, ChallengeStatus::Pending);

        let report = h.ladder.sweeper().run_once().await;
        assert_eq!(report.failures, 0);
        assert_eq!(report.expired_challenges, 0);
    }

    #[tokio::test]
    async fn rejects_disabled_mode_and_long_message() {
        let h = Harness::new();
        let alice = player();
        let scheduled_at = h.now() + TimeDelta::hours(1);

        let disabled = h
            .ladder
            .challenges()
            .create_challenge(
                &alice,
                NewChallenge {
                    game: Game::new("NBA_2K"),
                    mode: solo(),
                    scheduled_at,
                    message: None,
                },
            )
            .await;
        assert_eq!(kind(disabled), ErrorKind::Validation);

        let chatty = h
            .ladder
            .challenges()
            .create_challenge(
                &alice,
                NewChallenge {
                    game: game(),
                    mode: solo(),
                    scheduled_at,
                    message: Some("x".repeat(281)),
                },
            )
            .await;
        assert_eq!(kind(chatty), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn listing_hides_creator_and_marks_own() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let challenge = h.challenge(&alice).await;

        let seen_by_alice = h
            .ladder
            .challenges()
            .list_available_challenges(&alice, &game(), &solo())
            .await
            .unwrap();
        assert_eq!(seen_by_alice.len(), 1);
        assert!(seen_by_alice[0].own);

        let seen_by_bob = h
            .ladder
            .challenges()
            .list_available_challenges(&bob, &game(), &solo())
            .await
            .unwrap();
        assert_eq!(seen_by_bob[0].id, challenge.id);
        assert!(!seen_by_bob[0].own);
        let json = serde_json::to_value(&seen_by_bob[0]).unwrap();
        assert!(json.get("creator").is_none());

        h.ladder
            .challenges()
            .accept_challenge(&bob, challenge.id)
            .await
            .unwrap();
        let after = h
            .ladder
            .challenges()
            .list_available_challenges(&bob, &game(), &solo())
            .await
            .unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn accept_creates_match_and_notifies_both() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let challenge = h.challenge(&alice).await;

        let accepted = h
            .ladder
            .challenges()
            .accept_challenge(&bob, challenge.id)
            .await
            .unwrap();
        let m = &accepted.created_match;
        assert_eq!(accepted.challenge.status, ChallengeStatus::Accepted);
        assert_eq!(accepted.challenge.match_id, Some(m.id));
        assert_eq!(m.status, MatchStatus::InProgress);
        assert_eq!(m.side1, challenge.creator);
        assert_eq!(Some(m.side2), accepted.challenge.acceptor);
        assert_eq!(m.scheduled_at, challenge.scheduled_at);

        for user in [alice.user, bob.user] {
            assert!(h
                .sink
                .events_for(user)
                .iter()
                .any(|e| matches!(e, LadderEvent::ChallengeAccepted { match_id, .. } if *match_id == m.id)));
        }
    }

    #[tokio::test]
    async fn cannot_accept_own_or_taken_or_expired() {
        let h = Harness::new();
        let alice = player();
        let challenge = h.challenge(&alice).await;

        let own = h.ladder.challenges().accept_challenge(&alice, challenge.id).await;
        assert_eq!(kind(own), ErrorKind::Validation);

        h.ladder
            .challenges()
            .accept_challenge(&player(), challenge.id)
            .await
            .unwrap();
        let taken = h
            .ladder
            .challenges()
            .accept_challenge(&player(), challenge.id)
            .await;
        assert_eq!(kind(taken), ErrorKind::Conflict);

        let late = h
            .challenge_at(&alice, solo(), h.now() + TimeDelta::hours(3))
            .await;
        h.clock.set(late.scheduled_at);
        let expired = h.ladder.challenges().accept_challenge(&player(), late.id).await;
        assert_eq!(kind(expired), ErrorKind::Conflict);

        let missing = h
            .ladder
            .challenges()
            .accept_challenge(&player(), ChallengeId::new())
            .await;
        assert_eq!(kind(missing), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn concurrent_acceptors_produce_one_match() {
        let h = Harness::new();
        let challenge = h.challenge(&player()).await;
        let id = challenge.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ladder = h.ladder.clone();
                let acceptor = player();
                tokio::spawn(async move { ladder.challenges().accept_challenge(&acceptor, id).await })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for r in results.iter().filter(|r| r.is_err()) {
            assert_eq!(r.as_ref().unwrap_err().kind(), ErrorKind::Conflict);
        }

        let mut tx = h.tx().await;
        let stored = tx.get_challenge(challenge.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChallengeStatus::Accepted);
        let match_id = stored.match_id.expect("linked match");
        assert!(tx.get_match(match_id).await.unwrap().is_some());
    }
}

// ============================================================================
// Cancellation
// ============================================================================

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn allowed_more_than_an_hour_before_kickoff() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;

        h.clock.set(m.scheduled_at - TimeDelta::minutes(61));
        let cancelled = h.ladder.matches().cancel_match(&bob, m.id).await.unwrap();
        assert_eq!(cancelled.status, MatchStatus::Cancelled);

        let mut tx = h.tx().await;
        let challenge = tx
            .get_challenge(m.challenge_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Pending);
        assert_eq!(challenge.acceptor, None);
        assert_eq!(challenge.match_id, None);
        drop(tx);

        // The reopened challenge can be picked up again.
        let again = h
            .ladder
            .challenges()
            .accept_challenge(&player(), challenge.id)
            .await
            .unwrap();
        assert_ne!(again.created_match.id, m.id);
    }

    #[tokio::test]
    async fn refused_inside_the_last_hour() {
        let h = Harness::new();
        let alice = player();
        let m = h.arranged_match(&alice, &player()).await;

        h.clock.set(m.scheduled_at - TimeDelta::minutes(59));
        let late = h.ladder.matches().cancel_match(&alice, m.id).await;
        assert_eq!(kind(late), ErrorKind::Conflict);

        h.clock.set(m.scheduled_at - TimeDelta::minutes(60));
        let boundary = h.ladder.matches().cancel_match(&alice, m.id).await;
        assert_eq!(kind(boundary), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn only_participants_may_cancel() {
        let h = Harness::new();
        let m = h.arranged_match(&player(), &player()).await;
        let outsider = h.ladder.matches().cancel_match(&player(), m.id).await;
        assert_eq!(kind(outsider), ErrorKind::Authorization);
    }
}

// ============================================================================
// Results
// ============================================================================

mod results {
    use super::*;

    #[tokio::test]
    async fn agreeing_reports_complete_and_settle_once() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;
        h.kickoff(&m);

        let first = h.report(&alice, &m, m.side1, 3, 1).await.unwrap();
        assert_eq!(first.status, MatchStatus::AwaitingConfirmation);
        assert_eq!(first.verdict, Verdict::AwaitingOpponent);

        let second = h.report(&bob, &m, m.side1, 3, 1).await.unwrap();
        assert_eq!(second.status, MatchStatus::Completed);
        assert!(second.submission.validated);
        assert!(matches!(second.verdict, Verdict::Agreed { .. }));

        let details = h.ladder.matches().get_match_details(&alice, m.id).await.unwrap();
        assert_eq!(details.details.winner, Some(m.side1));
        assert_eq!(details.details.loser, Some(m.side2));
        assert_eq!((details.details.score1, details.details.score2), (Some(3), Some(1)));
        assert!(details.details.completed_at.is_some());
        assert!(details.submissions.iter().all(|s| s.validated));

        let a = h.stats(&alice, solo()).await.player;
        let b = h.stats(&bob, solo()).await.player;
        assert_eq!((a.victories, a.defeats, a.matches_played), (1, 0, 1));
        assert_eq!((b.victories, b.defeats, b.matches_played), (0, 1, 1));

        let mut tx = h.tx().await;
        let challenge = tx
            .get_challenge(m.challenge_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Completed);
        drop(tx);

        // A late resubmission changes nothing.
        let late = h.report(&bob, &m, m.side2, 0, 1).await;
        assert_eq!(kind(late), ErrorKind::Conflict);
        let b = h.stats(&bob, solo()).await.player;
        assert_eq!(b.matches_played, 1);
    }

    #[tokio::test]
    async fn same_side_cannot_submit_twice() {
        let h = Harness::new();
        let alice = player();
        let m = h.arranged_match(&alice, &player()).await;
        h.kickoff(&m);

        h.report(&alice, &m, m.side1, 2, 0).await.unwrap();
        let again = h.report(&alice, &m, m.side1, 2, 0).await;
        assert_eq!(kind(again), ErrorKind::Conflict);

        let details = h.ladder.matches().get_match_details(&alice, m.id).await.unwrap();
        assert_eq!(details.submissions.len(), 1);
        assert!(details.details.validation_deadline.is_some());
    }

    #[tokio::test]
    async fn conflicting_reports_wait_for_confirmation() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;
        h.kickoff(&m);

        h.report(&alice, &m, m.side1, 3, 1).await.unwrap();
        let receipt = h.report(&bob, &m, m.side2, 1, 3).await.unwrap();
        assert_eq!(receipt.verdict, Verdict::Conflicting);
        assert_eq!(receipt.status, MatchStatus::AwaitingConfirmation);

        let a = h.stats(&alice, solo()).await.player;
        assert_eq!(a.matches_played, 0);
    }

    #[tokio::test]
    async fn opponent_confirms_first_submission() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;
        h.kickoff(&m);

        h.report(&alice, &m, m.side2, 0, 2).await.unwrap();
        let own = h.ladder.results().confirm_result(&alice, m.id).await;
        assert_eq!(kind(own), ErrorKind::Validation);

        let done = h.ladder.results().confirm_result(&bob, m.id).await.unwrap();
        assert_eq!(done.status, MatchStatus::Completed);
        assert_eq!(done.winner, Some(m.side2));
        assert_eq!((done.score1, done.score2), (Some(0), Some(2)));

        let twice = h.ladder.results().confirm_result(&bob, m.id).await;
        assert_eq!(kind(twice), ErrorKind::Conflict);

        assert!(h.sink.events_for(alice.user).iter().any(|e| matches!(
            e,
            LadderEvent::MatchCompleted { winner, .. } if *winner == m.side2
        )));
    }

    #[tokio::test]
    async fn confirm_without_submission_is_a_conflict() {
        let h = Harness::new();
        let alice = player();
        let m = h.arranged_match(&alice, &player()).await;
        let early = h.ladder.results().confirm_result(&alice, m.id).await;
        assert_eq!(kind(early), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn rejects_bad_claims() {
        let h = Harness::new();
        let alice = player();
        let m = h.arranged_match(&alice, &player()).await;
        h.kickoff(&m);

        let negative = h.report(&alice, &m, m.side1, -1, 0).await;
        assert_eq!(kind(negative), ErrorKind::Validation);

        let stranger = h.report(&alice, &m, LadderPlayerId::new(), 1, 0).await;
        assert_eq!(kind(stranger), ErrorKind::Validation);

        let outsider = h.report(&player(), &m, m.side1, 1, 0).await;
        assert_eq!(kind(outsider), ErrorKind::Authorization);

        let missing = h
            .ladder
            .results()
            .submit_result(
                &alice,
                MatchId::new(),
                ResultClaim {
                    winner: m.side1,
                    score1: 1,
                    score2: 0,
                    evidence: Vec::new(),
                },
            )
            .await;
        assert_eq!(kind(missing), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn notification_failures_do_not_roll_back() {
        let h = Harness::with_sink(Arc::new(FailingSink));
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;
        h.kickoff(&m);

        h.report(&alice, &m, m.side1, 1, 0).await.unwrap();
        let receipt = h.report(&bob, &m, m.side1, 1, 0).await.unwrap();
        assert_eq!(receipt.status, MatchStatus::Completed);
        assert_eq!(h.stats(&alice, solo()).await.player.victories, 1);
    }
}

// ============================================================================
// Disputes
// ============================================================================

mod disputes {
    use super::*;

    fn claim() -> DisputeClaim {
        DisputeClaim {
            reason: "score was 1-2".into(),
            description: Some("  replay attached  ".into()),
            evidence: vec![EvidenceRef::new("uploads/replay.mp4")],
        }
    }

    /// Alice reports a 3-1 win, Bob confirms it.
    async fn completed(h: &Harness, alice: &Caller, bob: &Caller) -> Match {
        let m = h.arranged_match(alice, bob).await;
        h.kickoff(&m);
        h.report(alice, &m, m.side1, 3, 1).await.unwrap();
        h.ladder.results().confirm_result(bob, m.id).await.unwrap()
    }

    #[tokio::test]
    async fn submitter_cannot_dispute_but_opponent_can() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = completed(&h, &alice, &bob).await;

        let own = h.ladder.disputes().raise_dispute(&alice, m.id, claim()).await;
        assert_eq!(kind(own), ErrorKind::Conflict);

        let dispute = h
            .ladder
            .disputes()
            .raise_dispute(&bob, m.id, claim())
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Pending);
        assert_eq!(dispute.side, m.side2);
        assert_eq!(dispute.description.as_deref(), Some("replay attached"));

        let details = h.ladder.matches().get_match_details(&bob, m.id).await.unwrap();
        assert_eq!(details.details.status, MatchStatus::Disputed);
        assert_eq!(details.pending_disputes.len(), 1);

        let second = h.ladder.disputes().raise_dispute(&bob, m.id, claim()).await;
        assert_eq!(kind(second), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn dispute_requires_reason_and_completed_match() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let m = h.arranged_match(&alice, &bob).await;

        let early = h.ladder.disputes().raise_dispute(&bob, m.id, claim()).await;
        assert_eq!(kind(early), ErrorKind::Conflict);

        let blank = h
            .ladder
            .disputes()
            .raise_dispute(
                &bob,
                m.id,
                DisputeClaim {
                    reason: "   ".into(),
                    description: None,
                    evidence: Vec::new(),
                },
            )
            .await;
        assert_eq!(kind(blank), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn overturn_swaps_stats() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let moderator = Caller::moderator(UserId::new());
        let m = completed(&h, &alice, &bob).await;
        let dispute = h
            .ladder
            .disputes()
            .raise_dispute(&bob, m.id, claim())
            .await
            .unwrap();

        let pending = h
            .ladder
            .disputes()
            .pending_disputes(&moderator, m.id)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let resolution = DisputeResolution::Overturned {
            winner: m.side2,
            score1: 1,
            score2: 2,
        };
        let by_player = h
            .ladder
            .disputes()
            .resolve_dispute(&bob, dispute.id, resolution, None)
            .await;
        assert_eq!(kind(by_player), ErrorKind::Authorization);

        let resolved = h
            .ladder
            .disputes()
            .resolve_dispute(&moderator, dispute.id, resolution, Some("replay is clear".into()))
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(moderator.user));

        let details = h.ladder.matches().get_match_details(&alice, m.id).await.unwrap();
        assert_eq!(details.details.status, MatchStatus::Completed);
        assert_eq!(details.details.winner, Some(m.side2));
        assert_eq!(details.details.loser, Some(m.side1));
        assert!(details.pending_disputes.is_empty());

        let a = h.stats(&alice, solo()).await.player;
        let b = h.stats(&bob, solo()).await.player;
        assert_eq!((a.victories, a.defeats, a.matches_played), (0, 1, 1));
        assert_eq!((b.victories, b.defeats, b.matches_played), (1, 0, 1));

        let again = h
            .ladder
            .disputes()
            .resolve_dispute(&moderator, dispute.id, DisputeResolution::Upheld, None)
            .await;
        assert_eq!(kind(again), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn upheld_keeps_result() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let moderator = Caller::moderator(UserId::new());
        let m = completed(&h, &alice, &bob).await;
        let dispute = h
            .ladder
            .disputes()
            .raise_dispute(&bob, m.id, claim())
            .await
            .unwrap();

        h.ladder
            .disputes()
            .resolve_dispute(&moderator, dispute.id, DisputeResolution::Upheld, None)
            .await
            .unwrap();

        let a = h.stats(&alice, solo()).await.player;
        assert_eq!((a.victories, a.defeats), (1, 0));
        assert!(h.sink.events_for(bob.user).iter().any(|e| matches!(
            e,
            LadderEvent::DisputeResolved { overturned: false, .. }
        )));
    }

    #[tokio::test]
    async fn outsiders_cannot_see_disputes() {
        let h = Harness::new();
        let m = h.arranged_match(&player(), &player()).await;
        let seen = h.ladder.disputes().pending_disputes(&player(), m.id).await;
        assert_eq!(kind(seen), ErrorKind::Authorization);
    }
}

// ============================================================================
// Teams
// ============================================================================

mod teams {
    use super::*;

    #[tokio::test]
    async fn any_roster_member_acts_for_the_team() {
        let roster = Arc::new(StaticRoster::new());
        let (a1, a2, b1, b2) = (player(), player(), player(), player());
        roster.add_team(TeamId::new(), game(), duo(), vec![a1.user, a2.user]);
        roster.add_team(TeamId::new(), game(), duo(), vec![b1.user, b2.user]);
        let h = Harness::with_roster(roster.clone());

        let challenge = h
            .challenge_at(&a1, duo(), h.now() + TimeDelta::hours(3))
            .await;
        let own_team = h.ladder.challenges().accept_challenge(&a2, challenge.id).await;
        assert_eq!(kind(own_team), ErrorKind::Validation);

        let m = h
            .ladder
            .challenges()
            .accept_challenge(&b1, challenge.id)
            .await
            .unwrap()
            .created_match;
        assert_eq!(m.format, Format::Team);
        h.kickoff(&m);

        h.report(&a2, &m, m.side1, 2, 1).await.unwrap();
        let dup = h.report(&a1, &m, m.side1, 2, 1).await;
        assert_eq!(kind(dup), ErrorKind::Conflict);
        let done = h.report(&b2, &m, m.side1, 2, 1).await.unwrap();
        assert_eq!(done.status, MatchStatus::Completed);

        // Every member of both rosters hears about it.
        for user in [a1.user, a2.user, b1.user, b2.user] {
            assert!(h
                .sink
                .events_for(user)
                .iter()
                .any(|e| matches!(e, LadderEvent::MatchCompleted { .. })));
        }

        let team_a = h.stats(&a1, duo()).await;
        assert_eq!(team_a.player.victories, 1);
        assert!(matches!(team_a.player.owner, Competitor::Team(_)));
        assert_eq!(team_a.position, Some(1));

        roster.remove_member(
            match team_a.player.owner {
                Competitor::Team(id) => id,
                Competitor::User(_) => unreachable!(),
            },
            a2.user,
        );
        let removed = h.ladder.matches().get_match_details(&a2, m.id).await;
        assert_eq!(kind(removed), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn team_mode_requires_a_roster() {
        let h = Harness::with_roster(Arc::new(StaticRoster::new()));
        let lone = h
            .ladder
            .challenges()
            .create_challenge(
                &player(),
                NewChallenge {
                    game: game(),
                    mode: duo(),
                    scheduled_at: h.now() + TimeDelta::hours(1),
                    message: None,
                },
            )
            .await;
        assert_eq!(kind(lone), ErrorKind::Authorization);
    }
}

// ============================================================================
// Read models
// ============================================================================

mod read_models {
    use super::*;

    #[tokio::test]
    async fn my_matches_filter_by_status() {
        let h = Harness::new();
        let alice = player();
        let bob = player();
        let first = h.arranged_match(&alice, &bob).await;
        let second = h
            .ladder
            .challenges()
            .accept_challenge(
                &bob,
                h.challenge_at(&alice, solo(), h.now() + TimeDelta::hours(5))
                    .await
                    .id,
            )
            .await
            .unwrap()
            .created_match;

        h.kickoff(&first);
        h.report(&alice, &first, first.side1, 1, 0).await.unwrap();

        let all = h
            .ladder
            .matches()
            .list_my_matches(&alice, &game(), &solo(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let waiting = h
            .ladder
            .matches()
            .list_my_matches(&bob, &game(), &solo(), Some(MatchStatus::AwaitingConfirmation))
            .await
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, first.id);

        let stranger = h
            .ladder
            .matches()
            .list_my_matches(&player(), &game(), &solo(), None)
            .await
            .unwrap();
        assert!(stranger.is_empty());
    }

    #[tokio::test]
    async fn leaderboard_orders_by_victories() {
        let h = Harness::new();
        let (alice, bob, carol) = (player(), player(), player());

        for opponent in [&bob, &carol] {
            let m = h.arranged_match(&alice, opponent).await;
            h.kickoff(&m);
            h.report(&alice, &m, m.side1, 2, 0).await.unwrap();
            h.report(opponent, &m, m.side1, 2, 0).await.unwrap();
        }
        let m = h.arranged_match(&bob, &carol).await;
        h.kickoff(&m);
        h.report(&bob, &m, m.side1, 1, 0).await.unwrap();
        h.ladder.results().confirm_result(&carol, m.id).await.unwrap();

        // A player with no matches is absent from the board.
        let fresh = h.stats(&player(), solo()).await;
        assert_eq!(fresh.position, None);
        assert_eq!(fresh.player.matches_played, 0);

        let board = h
            .ladder
            .ranking()
            .leaderboard(&game(), &solo(), 10)
            .await
            .unwrap();
        let order: Vec<_> = board.iter().map(|s| (s.position, s.player.victories)).collect();
        assert_eq!(order, vec![(1, 2), (2, 1), (3, 0)]);
        assert_eq!(board[0].player.owner, Competitor::User(alice.user));

        let top = h
            .ladder
            .ranking()
            .leaderboard(&game(), &solo(), 1)
            .await
            .unwrap();
        assert_eq!(top.len(), 1);

        assert_eq!(h.stats(&carol, solo()).await.position, Some(3));
    }

    #[tokio::test]
    async fn outsiders_cannot_read_match_details() {
        let h = Harness::new();
        let m = h.arranged_match(&player(), &player()).await;
        let peek = h.ladder.matches().get_match_details(&player(), m.id).await;
        assert_eq!(kind(peek), ErrorKind::Authorization);
    }
}
