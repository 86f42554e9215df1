//! Outbound notifications.
//!
//! The engine publishes [`LadderEvent`]s after a transaction commits. Delivery
//! is fire-and-forget: a failing [`NotificationSink`] is logged and never
//! affects the outcome of the operation that produced the event.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::matches::MatchStatus;
use crate::roster::RosterService;
use crate::types::{ChallengeId, Competitor, DisputeId, Game, GameMode, LadderPlayerId, MatchId, UserId};

/// Events emitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LadderEvent {
    ChallengeCreated {
        challenge_id: ChallengeId,
        game: Game,
        mode: GameMode,
        scheduled_at: DateTime<Utc>,
    },
    ChallengeAccepted {
        challenge_id: ChallengeId,
        match_id: MatchId,
        scheduled_at: DateTime<Utc>,
    },
    ResultSubmitted {
        match_id: MatchId,
        side: LadderPlayerId,
        status: MatchStatus,
    },
    MatchCompleted {
        match_id: MatchId,
        winner: LadderPlayerId,
        score1: i32,
        score2: i32,
    },
    MatchCancelled {
        match_id: MatchId,
    },
    MatchDisputed {
        match_id: MatchId,
        dispute_id: DisputeId,
    },
    DisputeResolved {
        match_id: MatchId,
        dispute_id: DisputeId,
        overturned: bool,
    },
}

impl LadderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LadderEvent::ChallengeCreated { .. } => "challenge_created",
            LadderEvent::ChallengeAccepted { .. } => "challenge_accepted",
            LadderEvent::ResultSubmitted { .. } => "result_submitted",
            LadderEvent::MatchCompleted { .. } => "match_completed",
            LadderEvent::MatchCancelled { .. } => "match_cancelled",
            LadderEvent::MatchDisputed { .. } => "match_disputed",
            LadderEvent::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport closed")]
    Closed,

    #[error("notification delivery failed: {reason}")]
    Delivery { reason: String },
}

/// Transport for user-facing events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user: UserId, event: &LadderEvent) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn notify(&self, _user: UserId, _event: &LadderEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// An event addressed to one user.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub user: UserId,
    pub event: LadderEvent,
}

/// Hands events to an external transport over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, user: UserId, event: &LadderEvent) -> Result<(), NotifyError> {
        self.tx
            .send(Delivery {
                user,
                event: event.clone(),
            })
            .map_err(|_| NotifyError::Closed)
    }
}

/// Fans events out to the users behind each competitor.
#[derive(Clone)]
pub(crate) struct Notifier {
    sink: Arc<dyn NotificationSink>,
    roster: Arc<dyn RosterService>,
}

impl Notifier {
    pub(crate) fn new(sink: Arc<dyn NotificationSink>, roster: Arc<dyn RosterService>) -> Self {
        Self { sink, roster }
    }

    pub(crate) async fn publish(&self, recipients: &[Competitor], event: LadderEvent) {
        let mut users = BTreeSet::new();
        for recipient in recipients {
            match recipient {
                Competitor::User(user) => {
                    users.insert(*user);
                }
                Competitor::Team(team) => match self.roster.members(*team).await {
                    Ok(members) => users.extend(members),
                    Err(e) => {
                        tracing::warn!(team = %team, error = %e, "failed to resolve roster for notification");
                    }
                },
            }
        }

        for user in users {
            if let Err(e) = self.sink.notify(user, &event).await {
                tracing::warn!(
                    user = %user,
                    event = event.name(),
                    error = %e,
                    "notification delivery failed"
                );
            }
        }
    }
}
