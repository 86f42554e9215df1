//! Sweeper passes against the in-memory store: expiry, abandonment,
//! retention and rank maintenance.
//!
//! Run: `cargo test -p ladder --test sweeper`

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use common::*;
use ladder::challenge::ChallengeStatus;
use ladder::notify::LadderEvent;
use ladder::prelude::*;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn expires_challenges_whose_slot_has_passed() {
    let h = Harness::new();
    let alice = player();
    let soon = h.challenge(&alice).await;
    let later = h
        .challenge_at(&alice, solo(), h.now() + TimeDelta::hours(4))
        .await;

    h.clock.set(soon.scheduled_at - TimeDelta::minutes(1));
    assert_eq!(h.ladder.sweeper().run_once().await.expired_challenges, 0);

    h.clock.set(soon.scheduled_at);
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.expired_challenges, 1);
    assert_eq!(report.failures, 0);

    let mut tx = h.tx().await;
    let soon = tx.get_challenge(soon.id).await.unwrap().unwrap();
    let later = tx.get_challenge(later.id).await.unwrap().unwrap();
    assert_eq!(soon.status, ChallengeStatus::Expired);
    assert_eq!(later.status, ChallengeStatus::Pending);
    drop(tx);

    // Expired challenges drop out of listings.
    let open = h
        .ladder
        .challenges()
        .list_available_challenges(&player(), &game(), &solo())
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, later.id);
}

#[tokio::test]
async fn cancels_matches_nobody_reported_on() {
    let h = Harness::new();
    let alice = player();
    let bob = player();
    let m = h.arranged_match(&alice, &bob).await;

    // Exactly two hours after kickoff is still within the grace period.
    h.clock.set(m.scheduled_at + TimeDelta::hours(2));
    assert_eq!(h.ladder.sweeper().run_once().await.abandoned_matches, 0);

    h.clock.set(m.scheduled_at + TimeDelta::hours(2) + TimeDelta::minutes(15));
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.abandoned_matches, 1);
    assert_eq!(report.failures, 0);

    let mut tx = h.tx().await;
    let stored = tx.get_match(m.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Cancelled);
    let challenge = tx
        .get_challenge(m.challenge_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Cancelled);
    drop(tx);

    for user in [alice.user, bob.user] {
        assert!(h
            .sink
            .events_for(user)
            .contains(&LadderEvent::MatchCancelled { match_id: m.id }));
    }

    // A second pass finds nothing left to do.
    assert_eq!(h.ladder.sweeper().run_once().await.abandoned_matches, 0);
}

#[tokio::test]
async fn one_failing_match_does_not_stop_the_sweep() {
    let h = Harness::new();
    let stuck = h.arranged_match(&player(), &player()).await;
    let abandoned = h.arranged_match(&player(), &player()).await;

    let erin = player();
    let frank = player();
    let challenge = h
        .challenge_at(&erin, solo(), h.now() + TimeDelta::hours(3))
        .await;
    let played = h
        .ladder
        .challenges()
        .accept_challenge(&frank, challenge.id)
        .await
        .unwrap()
        .created_match;
    h.kickoff(&played);
    h.report(&erin, &played, played.side2, 0, 2).await.unwrap();
    h.report(&frank, &played, played.side2, 0, 2).await.unwrap();

    h.store.fail_lock_match(stuck.id);
    h.clock.set(stuck.scheduled_at + TimeDelta::hours(2) + TimeDelta::minutes(15));
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.failures, 1);
    assert_eq!(report.abandoned_matches, 1);
    // Later passes still ran.
    assert_eq!(report.ranks_changed, 2);

    let mut tx = h.tx().await;
    let stuck = tx.get_match(stuck.id).await.unwrap().unwrap();
    let abandoned = tx.get_match(abandoned.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, MatchStatus::InProgress);
    assert_eq!(abandoned.status, MatchStatus::Cancelled);
    let winner = tx.get_player(played.side2).await.unwrap().unwrap();
    assert_eq!(winner.rank, Some(1));
}

#[tokio::test]
async fn leaves_reported_matches_alone() {
    let h = Harness::new();
    let alice = player();
    let m = h.arranged_match(&alice, &player()).await;
    h.kickoff(&m);
    h.report(&alice, &m, m.side1, 1, 0).await.unwrap();

    h.clock.set(m.scheduled_at + TimeDelta::hours(6));
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.abandoned_matches, 0);

    let details = h.ladder.matches().get_match_details(&alice, m.id).await.unwrap();
    assert_eq!(details.details.status, MatchStatus::AwaitingConfirmation);
}

#[tokio::test]
async fn purges_terminal_records_after_retention() {
    let h = Harness::new();
    let alice = player();
    let bob = player();

    let expired = h.challenge(&alice).await;
    let abandoned = h
        .ladder
        .challenges()
        .accept_challenge(
            &bob,
            h.challenge_at(&alice, solo(), h.now() + TimeDelta::hours(3))
                .await
                .id,
        )
        .await
        .unwrap()
        .created_match;
    let played = h
        .ladder
        .challenges()
        .accept_challenge(
            &bob,
            h.challenge_at(&alice, solo(), h.now() + TimeDelta::hours(4))
                .await
                .id,
        )
        .await
        .unwrap()
        .created_match;
    h.kickoff(&played);
    h.report(&alice, &played, played.side1, 2, 1).await.unwrap();
    h.report(&bob, &played, played.side1, 2, 1).await.unwrap();

    // Expire and abandon first.
    h.clock.set(start() + TimeDelta::hours(8));
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.expired_challenges, 1);
    assert_eq!(report.abandoned_matches, 1);
    assert_eq!(report.purged_challenges, 0);

    h.clock.set(start() + TimeDelta::days(7));
    let report = h.ladder.sweeper().run_once().await;
    assert_eq!(report.purged_matches, 1);
    // The expired, abandoned and completed challenges.
    assert_eq!(report.purged_challenges, 3);

    let mut tx = h.tx().await;
    assert!(tx.get_challenge(expired.id).await.unwrap().is_none());
    assert!(tx.get_match(abandoned.id).await.unwrap().is_none());
    let kept = tx.get_match(played.id).await.unwrap().unwrap();
    assert_eq!(kept.status, MatchStatus::Completed);
    drop(tx);

    // Completed results still count after their challenge is gone.
    assert_eq!(h.stats(&alice, solo()).await.player.victories, 1);
}

#[tokio::test]
async fn rank_pass_is_idempotent() {
    let h = Harness::new();
    let alice = player();
    let bob = player();
    let m = h.arranged_match(&alice, &bob).await;
    h.kickoff(&m);
    h.report(&alice, &m, m.side2, 0, 1).await.unwrap();
    h.ladder.results().confirm_result(&bob, m.id).await.unwrap();

    let first = h.ladder.sweeper().run_once().await;
    assert_eq!(first.ranks_changed, 2);
    let second = h.ladder.sweeper().run_once().await;
    assert_eq!(second.ranks_changed, 0);

    let mut tx = h.tx().await;
    let winner = tx.get_player(m.side2).await.unwrap().unwrap();
    let loser = tx.get_player(m.side1).await.unwrap().unwrap();
    assert_eq!(winner.rank, Some(1));
    assert_eq!(loser.rank, Some(2));
}

#[tokio::test]
async fn spawned_sweeper_stops_on_cancel() {
    let h = Harness::new();
    let challenge = h.challenge(&player()).await;
    h.clock.set(challenge.scheduled_at + TimeDelta::minutes(30));

    let shutdown = CancellationToken::new();
    let handle = h.ladder.sweeper().spawn(shutdown.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut tx = h.tx().await;
            let status = tx.get_challenge(challenge.id).await.unwrap().unwrap().status;
            drop(tx);
            if status == ChallengeStatus::Expired {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first sweep runs immediately");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper stops")
        .expect("sweeper task panicked");
}
