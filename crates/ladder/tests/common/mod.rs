//! Shared fixtures for the in-memory integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ladder::prelude::*;
use ladder::roster::RosterService;
use ladder::storage::LadderTransaction;
use ladder::testing::{ManualClock, RecordingSink};

pub fn game() -> Game {
    Game::new("FC_26")
}

pub fn solo() -> GameMode {
    GameMode::new("1v1")
}

pub fn duo() -> GameMode {
    GameMode::new("2v2")
}

/// 2026-03-14 12:00:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

pub fn config() -> LadderConfig {
    LadderConfig {
        modes: vec![
            GameModeConfig::new("FC_26", "1v1", Format::Solo),
            GameModeConfig::new("FC_26", "2v2", Format::Team),
        ],
        ..Default::default()
    }
}

pub struct Harness {
    pub ladder: Ladder,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_roster(Arc::new(NoRosters))
    }

    pub fn with_roster(roster: Arc<dyn RosterService>) -> Self {
        let sink = Arc::new(RecordingSink::new());
        Self::build(roster, sink.clone(), sink, config())
    }

    pub fn with_config(config: LadderConfig) -> Self {
        let sink = Arc::new(RecordingSink::new());
        Self::build(Arc::new(NoRosters), sink.clone(), sink, config)
    }

    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self::build(
            Arc::new(NoRosters),
            sink,
            Arc::new(RecordingSink::new()),
            config(),
        )
    }

    fn build(
        roster: Arc<dyn RosterService>,
        sink: Arc<dyn NotificationSink>,
        recording: Arc<RecordingSink>,
        config: LadderConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let ladder = Ladder::builder(store.clone())
            .roster(roster)
            .notifications(sink)
            .clock(clock.clone())
            .config(config)
            .build()
            .expect("valid config");
        Self {
            ladder,
            store,
            clock,
            sink: recording,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        ladder::clock::Clock::now(self.clock.as_ref())
    }

    pub async fn tx(&self) -> Box<dyn LadderTransaction> {
        self.store.begin().await.expect("begin")
    }

    /// A solo challenge two hours from now.
    pub async fn challenge(&self, creator: &Caller) -> Challenge {
        self.challenge_at(creator, solo(), self.now() + TimeDelta::hours(2))
            .await
    }

    pub async fn challenge_at(
        &self,
        creator: &Caller,
        mode: GameMode,
        scheduled_at: DateTime<Utc>,
    ) -> Challenge {
        self.ladder
            .challenges()
            .create_challenge(
                creator,
                NewChallenge {
                    game: game(),
                    mode,
                    scheduled_at,
                    message: None,
                },
            )
            .await
            .expect("challenge created")
    }

    /// A solo match between `creator` (side 1) and `acceptor` (side 2).
    pub async fn arranged_match(&self, creator: &Caller, acceptor: &Caller) -> Match {
        let challenge = self.challenge(creator).await;
        self.ladder
            .challenges()
            .accept_challenge(acceptor, challenge.id)
            .await
            .expect("challenge accepted")
            .created_match
    }

    /// Move the clock one slot past kickoff.
    pub fn kickoff(&self, m: &Match) {
        self.clock.set(m.scheduled_at + TimeDelta::minutes(15));
    }

    pub async fn report(
        &self,
        caller: &Caller,
        m: &Match,
        winner: LadderPlayerId,
        score1: i32,
        score2: i32,
    ) -> Result<SubmissionReceipt, LadderError> {
        self.ladder
            .results()
            .submit_result(
                caller,
                m.id,
                ResultClaim {
                    winner,
                    score1,
                    score2,
                    evidence: vec![EvidenceRef::new("uploads/screenshot.png")],
                },
            )
            .await
    }

    pub async fn stats(&self, caller: &Caller, mode: GameMode) -> PlayerStats {
        self.ladder
            .ranking()
            .player_stats(caller, &game(), &mode)
            .await
            .expect("player stats")
    }
}

pub fn player() -> Caller {
    Caller::player(UserId::new())
}
