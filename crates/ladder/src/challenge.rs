//! Challenges: open proposals to play at a fixed quarter-hour slot.
//!
//! A challenge is created PENDING by one competitor and accepted by another.
//! Acceptance creates the [`Match`] and moves the challenge to ACCEPTED in
//! the same transaction, using a conditional update on the PENDING status so
//! that exactly one of several racing acceptors wins.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::{after, LadderConfig};
use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::matches::Match;
use crate::notify::LadderEvent;
use crate::types::{Caller, ChallengeId, Game, GameMode, LadderPlayerId, MatchId};

/// Lifecycle state of a [`Challenge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
    Completed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "PENDING",
            ChallengeStatus::Accepted => "ACCEPTED",
            ChallengeStatus::Expired => "EXPIRED",
            ChallengeStatus::Cancelled => "CANCELLED",
            ChallengeStatus::Completed => "COMPLETED",
        }
    }

    /// PENDING and ACCEPTED challenges hold their creator's slot.
    pub fn is_active(&self) -> bool {
        matches!(self, ChallengeStatus::Pending | ChallengeStatus::Accepted)
    }

    /// Eligible for retention cleanup.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeStatus {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ChallengeStatus::Pending),
            "ACCEPTED" => Ok(ChallengeStatus::Accepted),
            "EXPIRED" => Ok(ChallengeStatus::Expired),
            "CANCELLED" => Ok(ChallengeStatus::Cancelled),
            "COMPLETED" => Ok(ChallengeStatus::Completed),
            other => Err(LadderError::internal(format!(
                "unknown challenge status '{other}'"
            ))),
        }
    }
}

/// State changes a challenge can undergo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeEvent {
    Accept {
        acceptor: LadderPlayerId,
        match_id: MatchId,
    },
    Expire,
    /// The match was cancelled before kickoff; the slot opens again.
    Reopen,
    /// The match was abandoned.
    Cancel,
    /// The match completed.
    Complete,
}

impl ChallengeEvent {
    fn name(&self) -> &'static str {
        match self {
            ChallengeEvent::Accept { .. } => "accept",
            ChallengeEvent::Expire => "expire",
            ChallengeEvent::Reopen => "reopen",
            ChallengeEvent::Cancel => "cancel",
            ChallengeEvent::Complete => "complete",
        }
    }
}

/// The challenge transition table.
fn next_status(from: ChallengeStatus, event: &ChallengeEvent) -> Option<ChallengeStatus> {
    use ChallengeStatus::*;
    match (from, event) {
        (Pending, ChallengeEvent::Accept { .. }) => Some(Accepted),
        (Pending, ChallengeEvent::Expire) => Some(Expired),
        (Accepted, ChallengeEvent::Reopen) => Some(Pending),
        (Accepted, ChallengeEvent::Cancel) => Some(Cancelled),
        (Accepted, ChallengeEvent::Complete) => Some(Completed),
        _ => None,
    }
}

/// A proposal to play at a specific slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub creator: LadderPlayerId,
    pub acceptor: Option<LadderPlayerId>,
    pub game: Game,
    pub mode: GameMode,
    pub scheduled_at: DateTime<Utc>,
    /// Always equal to `scheduled_at`.
    pub expires_at: DateTime<Utc>,
    pub message: Option<String>,
    pub status: ChallengeStatus,
    pub match_id: Option<MatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Challenge {
    pub fn new(
        creator: LadderPlayerId,
        game: Game,
        mode: GameMode,
        scheduled_at: DateTime<Utc>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChallengeId::new(),
            creator,
            acceptor: None,
            game,
            mode,
            scheduled_at,
            expires_at: scheduled_at,
            message,
            status: ChallengeStatus::Pending,
            match_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `event`, returning the updated challenge.
    pub fn apply(&self, event: ChallengeEvent, now: DateTime<Utc>) -> Result<Challenge, LadderError> {
        let status =
            next_status(self.status, &event).ok_or_else(|| LadderError::InvalidTransition {
                entity: "challenge",
                from: self.status.to_string(),
                event: event.name().to_string(),
            })?;

        let mut next = self.clone();
        next.status = status;
        next.updated_at = now;
        match event {
            ChallengeEvent::Accept { acceptor, match_id } => {
                next.acceptor = Some(acceptor);
                next.match_id = Some(match_id);
            }
            ChallengeEvent::Reopen => {
                next.acceptor = None;
                next.match_id = None;
            }
            ChallengeEvent::Expire | ChallengeEvent::Cancel | ChallengeEvent::Complete => {}
        }
        Ok(next)
    }
}

/// Check that `scheduled_at` is a valid slot at time `now`.
///
/// Valid slots lie strictly after `now`, no further than the scheduling
/// horizon, and start exactly on a slot boundary.
pub fn validate_slot(
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &LadderConfig,
) -> Result<(), LadderError> {
    if scheduled_at <= now {
        return Err(LadderError::validation("scheduled time must be in the future"));
    }
    if scheduled_at > after(now, config.horizon())? {
        return Err(LadderError::validation(format!(
            "scheduled time must be within {} hours",
            config.scheduling_horizon.as_secs() / 3600
        )));
    }
    if scheduled_at.minute() % config.slot_minutes != 0
        || scheduled_at.second() != 0
        || scheduled_at.nanosecond() != 0
    {
        return Err(LadderError::validation(format!(
            "scheduled time must fall on a {}-minute boundary",
            config.slot_minutes
        )));
    }
    Ok(())
}

/// Parameters of [`ChallengeManager::create_challenge`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewChallenge {
    pub game: Game,
    pub mode: GameMode,
    pub scheduled_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// An open challenge as shown to prospective acceptors. The creator stays
/// anonymous until the challenge is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeListing {
    pub id: ChallengeId,
    pub game: Game,
    pub mode: GameMode,
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub message: Option<String>,
    /// Whether the requester created this challenge.
    pub own: bool,
}

/// Result of a successful acceptance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptedChallenge {
    pub challenge: Challenge,
    #[serde(rename = "match")]
    pub created_match: Match,
}

/// Creates, lists and accepts challenges.
#[derive(Clone)]
pub struct ChallengeManager {
    ctx: Arc<LadderContext>,
}

impl ChallengeManager {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Create a PENDING challenge at a free slot of the caller.
    #[instrument(skip_all, fields(user = %caller.user, game = %request.game, mode = %request.mode))]
    pub async fn create_challenge(
        &self,
        caller: &Caller,
        request: NewChallenge,
    ) -> Result<Challenge, LadderError> {
        let now = self.ctx.now();
        let mode = self.ctx.mode(&request.game, &request.mode)?;

        let message = match request.message.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(m) if m.chars().count() > self.ctx.config.max_message_len => {
                return Err(LadderError::validation(format!(
                    "message exceeds {} characters",
                    self.ctx.config.max_message_len
                )));
            }
            Some(m) => Some(m.to_string()),
        };
        validate_slot(request.scheduled_at, now, &self.ctx.config)?;
        let owner = self.ctx.competitor_for(caller, mode).await?;

        let mut tx = self.ctx.store.begin().await?;
        let creator = tx
            .get_or_create_player(owner, &request.game, &request.mode, now)
            .await?;
        if tx
            .find_active_challenge(creator.id, request.scheduled_at)
            .await?
            .is_some()
        {
            return Err(LadderError::conflict(
                "you already have a challenge at this time slot",
            ));
        }

        let challenge = Challenge::new(
            creator.id,
            request.game,
            request.mode,
            request.scheduled_at,
            message,
            now,
        );
        tx.insert_challenge(&challenge).await?;
        tx.commit().await?;

        tracing::info!(
            challenge_id = %challenge.id,
            scheduled_at = %challenge.scheduled_at,
            "challenge created"
        );
        self.ctx
            .notifier
            .publish(
                &[owner],
                LadderEvent::ChallengeCreated {
                    challenge_id: challenge.id,
                    game: challenge.game.clone(),
                    mode: challenge.mode.clone(),
                    scheduled_at: challenge.scheduled_at,
                },
            )
            .await;
        Ok(challenge)
    }

    /// Open challenges of a game mode, soonest first.
    #[instrument(skip_all, fields(user = %caller.user, game = %game, mode = %mode))]
    pub async fn list_available_challenges(
        &self,
        caller: &Caller,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Vec<ChallengeListing>, LadderError> {
        let now = self.ctx.now();
        let mode_config = self.ctx.mode(game, mode)?;
        let owner = self.ctx.competitor_for(caller, mode_config).await?;

        let mut tx = self.ctx.store.begin().await?;
        let own = tx.find_player(owner, game, mode).await?.map(|p| p.id);
        let open = tx.list_open_challenges(game, mode, now).await?;
        tx.commit().await?;

        tracing::debug!(count = open.len(), "listed open challenges");
        Ok(open
            .into_iter()
            .map(|c| ChallengeListing {
                own: Some(c.creator) == own,
                id: c.id,
                game: c.game,
                mode: c.mode,
                scheduled_at: c.scheduled_at,
                expires_at: c.expires_at,
                message: c.message,
            })
            .collect())
    }

    /// Accept a PENDING challenge, creating its match.
    #[instrument(skip_all, fields(user = %caller.user, challenge_id = %challenge_id))]
    pub async fn accept_challenge(
        &self,
        caller: &Caller,
        challenge_id: ChallengeId,
    ) -> Result<AcceptedChallenge, LadderError> {
        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;

        let challenge = tx
            .get_challenge(challenge_id)
            .await?
            .ok_or_else(|| LadderError::not_found("challenge", challenge_id))?;
        let mode = self.ctx.mode(&challenge.game, &challenge.mode)?;
        let owner = self.ctx.competitor_for(caller, mode).await?;
        let acceptor = tx
            .get_or_create_player(owner, &challenge.game, &challenge.mode, now)
            .await?;

        if acceptor.id == challenge.creator {
            return Err(LadderError::validation("you cannot accept your own challenge"));
        }
        if challenge.status != ChallengeStatus::Pending {
            return Err(LadderError::conflict("challenge is no longer available"));
        }
        if challenge.expires_at <= now {
            return Err(LadderError::conflict("challenge has expired"));
        }

        let creator = tx
            .get_player(challenge.creator)
            .await?
            .ok_or_else(|| LadderError::internal(format!("challenge {} has no creator", challenge.id)))?;

        let created_match = Match::from_challenge(&challenge, acceptor.id, mode.format, now);
        tx.insert_match(&created_match).await?;

        let accepted = challenge.apply(
            ChallengeEvent::Accept {
                acceptor: acceptor.id,
                match_id: created_match.id,
            },
            now,
        )?;
        if !tx
            .update_challenge(&accepted, ChallengeStatus::Pending)
            .await?
        {
            tx.rollback().await?;
            return Err(LadderError::conflict("challenge is no longer available"));
        }
        tx.commit().await?;

        tracing::info!(match_id = %created_match.id, "challenge accepted");
        self.ctx
            .notifier
            .publish(
                &[creator.owner, acceptor.owner],
                LadderEvent::ChallengeAccepted {
                    challenge_id: accepted.id,
                    match_id: created_match.id,
                    scheduled_at: accepted.scheduled_at,
                },
            )
            .await;

        Ok(AcceptedChallenge {
            challenge: accepted,
            created_match,
        })
    }
}
